/// The modulus size in bits of generated RSA keys.
pub const RSA_KEY_SIZE: usize = 2048;

/// The subject and issuer country used when none is given.
pub const DEFAULT_COUNTRY: &str = "US";

/// Certificates are valid for this many years, minus [`VALIDITY_MARGIN_MINUTES`].
pub const DEFAULT_VALIDITY_YEARS: i64 = 10;

/// Subtracted from the end of the validity window, so that the notAfter of a
/// certificate created today never reaches midnight.
pub const VALIDITY_MARGIN_MINUTES: i64 = 1;

/// Placed between the short hostname and the date in default CA names, e.g.
/// `devboxca-260101`.
pub const CA_NAME_SEPARATOR: &str = "ca-";
