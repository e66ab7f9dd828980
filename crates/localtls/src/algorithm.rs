//! The closed set of public-key algorithms this crate can generate, encode
//! and sign with.
use std::str::FromStr;

use const_oid::{
    ObjectIdentifier,
    db::{
        rfc5912::{ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1},
        rfc8410::ID_ED_25519,
    },
};
use snafu::{Snafu, ensure};
use strum::{Display, EnumIter};

/// Error returned whenever an algorithm name, algorithm OID or curve is not
/// one of the supported [`Algorithm`] variants.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum UnsupportedAlgorithmError {
    #[snafu(display("unsupported algorithm {name:?}, expected one of ed25519, rsa or ecdsa"))]
    UnsupportedName { name: String },

    #[snafu(display("unsupported public key algorithm {oid}"))]
    UnsupportedOid { oid: ObjectIdentifier },

    #[snafu(display("unsupported elliptic curve {curve:?}, only P-256 is supported"))]
    UnsupportedCurve { curve: Option<ObjectIdentifier> },
}

/// Supported public-key algorithms.
///
/// The algorithm selects the concrete key implementation in
/// [`keys`](crate::keys) and round-trips through X.509 and PKCS#8 via the
/// standard public-key algorithm identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Algorithm {
    #[strum(serialize = "ed25519")]
    Ed25519,

    /// RSA with a 2048-bit modulus, signing with PKCS#1 v1.5 and SHA-256.
    #[strum(serialize = "rsa")]
    Rsa,

    /// ECDSA on the NIST P-256 curve, signing with SHA-256.
    #[strum(serialize = "ecdsa")]
    Ecdsa,
}

impl FromStr for Algorithm {
    type Err = UnsupportedAlgorithmError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "rsa" => Ok(Self::Rsa),
            "ecdsa" | "p256" | "ecdsa-p256" => Ok(Self::Ecdsa),
            _ => UnsupportedNameSnafu { name: input }.fail(),
        }
    }
}

impl Algorithm {
    /// The OID found in the `algorithm` field of PKCS#8 and PKIX structures.
    pub fn key_algorithm_oid(self) -> ObjectIdentifier {
        match self {
            Self::Ed25519 => ID_ED_25519,
            Self::Rsa => RSA_ENCRYPTION,
            Self::Ecdsa => ID_EC_PUBLIC_KEY,
        }
    }

    /// Maps a PKCS#8 / PKIX algorithm identifier back to the variant.
    ///
    /// For `id-ecPublicKey` the named curve must be `secp256r1`. The `curve`
    /// argument is ignored for the other algorithms.
    pub fn from_key_algorithm(
        oid: ObjectIdentifier,
        curve: Option<ObjectIdentifier>,
    ) -> Result<Self, UnsupportedAlgorithmError> {
        match oid {
            ID_ED_25519 => Ok(Self::Ed25519),
            RSA_ENCRYPTION => Ok(Self::Rsa),
            ID_EC_PUBLIC_KEY => {
                ensure!(curve == Some(SECP_256_R_1), UnsupportedCurveSnafu { curve });
                Ok(Self::Ecdsa)
            }
            oid => UnsupportedOidSnafu { oid }.fail(),
        }
    }
}
