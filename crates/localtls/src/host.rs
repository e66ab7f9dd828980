//! Host identity used for default certificate names.
use jiff::Zoned;
use snafu::{ResultExt, Snafu, ensure};

use crate::ca::CA_NAME_SEPARATOR;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read the hostname"))]
    ReadHostname { source: std::io::Error },

    #[snafu(display("the hostname {hostname:?} is not valid UTF-8"))]
    InvalidHostname { hostname: String },

    #[snafu(display("the hostname is empty"))]
    EmptyHostname,
}

/// Returns the hostname of this machine without its DNS suffix.
///
/// An empty hostname is an error, as certificates for it would be
/// indistinguishable from those of other hosts.
pub fn short_hostname() -> Result<String> {
    let hostname = hostname::get().context(ReadHostnameSnafu)?;
    let hostname = hostname
        .into_string()
        .map_err(|hostname| Error::InvalidHostname {
            hostname: hostname.to_string_lossy().into_owned(),
        })?;

    let short = short_name(&hostname);
    ensure!(!short.is_empty(), EmptyHostnameSnafu);

    Ok(short.to_owned())
}

/// Strips everything from the first dot onwards.
pub fn short_name(fqdn: &str) -> &str {
    fqdn.split_once('.').map_or(fqdn, |(short, _)| short)
}

/// Returns the default common name of a CA created on this host today, e.g.
/// `devboxca-261018`. The date is the local date.
pub fn default_ca_common_name() -> Result<String> {
    let hostname = short_hostname()?;
    Ok(ca_common_name(&hostname, &Zoned::now()))
}

fn ca_common_name(hostname: &str, now: &Zoned) -> String {
    format!(
        "{hostname}{CA_NAME_SEPARATOR}{date}",
        date = now.strftime("%y%m%d")
    )
}
