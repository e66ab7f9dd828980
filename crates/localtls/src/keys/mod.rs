//! Contains primitives to create private keys, which are used to sign CAs
//! and bind to leaf certificates.
//!
//! This module currently provides the following algorithms:
//!
//! ## Ed25519
//!
//! The Ed25519 implementation is provided by the [`ed25519_dalek`] crate.
//!
//! ```no_run
//! use localtls::keys::{ed25519::SigningKey, CertificateKeypair};
//! let key = SigningKey::new().unwrap();
//! ```
//!
//! ## ECDSA
//!
//! In order to work with ECDSA keys, this crate requires two dependencies:
//! [`ecdsa`], which provides primitives and traits, and [`p256`] which
//! implements the NIST P-256 elliptic curve and supports ECDSA.
//!
//! ```no_run
//! use localtls::keys::{ecdsa::SigningKey, CertificateKeypair};
//! let key = SigningKey::new().unwrap();
//! ```
//!
//! ## RSA
//!
//! In order to work with RSA keys, this crate requires the [`rsa`] dependency.
//!
//! ```no_run
//! use localtls::keys::{rsa::SigningKey, CertificateKeypair};
//! let key = SigningKey::new().unwrap();
//! ```
//!
//! It should be noted, that the crate is currently vulnerable to the recently
//! discovered Marvin attack. See:
//!
//! - <https://people.redhat.com/~hkario/marvin/>
//! - <https://rustsec.org/advisories/RUSTSEC-2023-0071.html>
//! - <https://github.com/RustCrypto/RSA/issues/19>
//!
//! Code which does not know the algorithm statically works with the
//! [`PrivateKey`] and [`PublicKey`] enums, which dispatch to the variants
//! above.
use std::fmt::Debug;

use ::rsa::{Pkcs1v15Sign, RsaPublicKey, pkcs1::EncodeRsaPublicKey, traits::PublicKeyParts};
use pkcs8::{PrivateKeyInfo, SecretDocument};
use rand_core::{CryptoRngCore, OsRng};
use sha2::{Digest, Sha256};
use signature::{Keypair, Signer, Verifier};
use snafu::{ResultExt, Snafu};
use tracing::instrument;
use x509_cert::{
    der::{Document, asn1::BitString},
    spki::{
        AlgorithmIdentifierOwned, DecodePublicKey, DynSignatureAlgorithmIdentifier,
        EncodePublicKey, SignatureBitStringEncoding, SubjectPublicKeyInfoOwned,
        SubjectPublicKeyInfoRef,
    },
};
use zeroize::Zeroizing;

use crate::{
    algorithm::{Algorithm, UnsupportedAlgorithmError},
    pem::{PRIVATE_KEY_LABEL, PUBLIC_KEY_LABEL, encode_block, pem_text},
};

pub mod ecdsa;
pub mod ed25519;
pub mod rsa;

/// Message signed and verified by [`CertificateKeypair::validate`].
pub(crate) const SELF_CHECK_MESSAGE: &[u8] = b"localtls key self check";

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Ed25519 key operation failed"))]
    Ed25519 { source: ed25519::Error },

    #[snafu(display("RSA key operation failed"))]
    Rsa { source: self::rsa::Error },

    #[snafu(display("ECDSA key operation failed"))]
    Ecdsa { source: self::ecdsa::Error },

    #[snafu(display("failed to decode PKCS8 private key info"))]
    DecodePrivateKeyInfo { source: pkcs8::Error },

    #[snafu(display("failed to decode PKIX subject public key info"))]
    DecodePublicKeyInfo { source: x509_cert::spki::Error },

    #[snafu(display("failed to decode {algorithm} public key"))]
    DecodePublicKey {
        source: x509_cert::spki::Error,
        algorithm: Algorithm,
    },

    #[snafu(display("failed to encode {algorithm} public key as PKIX DER"))]
    EncodePublicKey {
        source: x509_cert::spki::Error,
        algorithm: Algorithm,
    },

    #[snafu(context(false))]
    UnsupportedAlgorithm { source: UnsupportedAlgorithmError },

    #[snafu(display("signature does not verify under the {algorithm} public key"))]
    VerifySignature {
        source: signature::Error,
        algorithm: Algorithm,
    },

    #[snafu(display("signature does not verify under the RSA public key"))]
    VerifyRsaSignature { source: ::rsa::Error },

    #[snafu(display("PKCS1 encoding is only defined for RSA keys, not {algorithm}"))]
    NotAnRsaKey { algorithm: Algorithm },

    #[snafu(display("failed to encode RSA public key as PKCS1 DER"))]
    EncodePkcs1 { source: ::rsa::pkcs1::Error },
}

// NOTE: Signatures are plain bytes here, the typed signatures of the backend
// crates don't leave the variant modules.
pub trait CertificateKeypair: Debug + Sized {
    type VerifyingKey: Clone + Debug + PartialEq + EncodePublicKey;
    type Error: std::error::Error + 'static;

    /// The algorithm implemented by this key pair.
    const ALGORITHM: Algorithm;

    /// Generates a new key with the default random-number generator [`OsRng`].
    fn new() -> Result<Self, Self::Error> {
        Self::new_with_rng(&mut OsRng)
    }

    /// Generates a new key with a custom random-number generator.
    fn new_with_rng<Rng>(rng: &mut Rng) -> Result<Self, Self::Error>
    where
        Rng: CryptoRngCore + Sized;

    /// Returns the verifying (public) half of the keypair.
    fn verifying_key(&self) -> Self::VerifyingKey;

    /// Creates a signing key pair from an unencrypted PKCS#8 document.
    fn from_pkcs8_der(der: &[u8]) -> Result<Self, Self::Error>;

    /// Serializes the signing key as an unencrypted PKCS#8 document.
    fn to_pkcs8_der(&self) -> Result<SecretDocument, Self::Error>;

    /// Checks that the key pair is internally consistent by signing a fixed
    /// message and verifying the signature with the public half.
    fn validate(&self) -> Result<(), Self::Error>;

    /// Signs `message` and returns the signature in the encoding X.509 uses
    /// for this algorithm.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Self::Error>;

    /// The algorithm identifier placed into the `signatureAlgorithm` field of
    /// certificates signed by this key.
    fn signature_algorithm_identifier() -> AlgorithmIdentifierOwned;

    /// The key length in bits
    fn key_size() -> usize;
}

/// A private key of any supported [`Algorithm`].
#[derive(Debug)]
pub enum PrivateKey {
    Ed25519(ed25519::SigningKey),
    Rsa(self::rsa::SigningKey),
    Ecdsa(self::ecdsa::SigningKey),
}

impl PrivateKey {
    /// Generates a fresh private key for `algorithm`.
    ///
    /// This is the single point at which the algorithm is dispatched to a
    /// concrete key implementation. RSA keys use a 2048-bit modulus, ECDSA
    /// keys the P-256 curve.
    #[instrument(name = "create_private_key")]
    pub fn new(algorithm: Algorithm) -> Result<Self> {
        Self::new_with_rng(algorithm, &mut OsRng)
    }

    /// Same as [`Self::new`], but with a custom random-number generator.
    pub fn new_with_rng<Rng>(algorithm: Algorithm, rng: &mut Rng) -> Result<Self>
    where
        Rng: CryptoRngCore + Sized,
    {
        let key = match algorithm {
            Algorithm::Ed25519 => {
                Self::Ed25519(ed25519::SigningKey::new_with_rng(rng).context(Ed25519Snafu)?)
            }
            Algorithm::Rsa => {
                Self::Rsa(self::rsa::SigningKey::new_with_rng(rng).context(RsaSnafu)?)
            }
            Algorithm::Ecdsa => {
                Self::Ecdsa(self::ecdsa::SigningKey::new_with_rng(rng).context(EcdsaSnafu)?)
            }
        };

        Ok(key)
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Ecdsa(_) => Algorithm::Ecdsa,
        }
    }

    /// Parses an unencrypted PKCS#8 document. The variant is chosen by the
    /// algorithm identifier inside the document.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::try_from(der).context(DecodePrivateKeyInfoSnafu)?;
        let curve = info.algorithm.parameters_oid().ok();

        let key = match Algorithm::from_key_algorithm(info.algorithm.oid, curve)? {
            Algorithm::Ed25519 => {
                Self::Ed25519(ed25519::SigningKey::from_pkcs8_der(der).context(Ed25519Snafu)?)
            }
            Algorithm::Rsa => {
                Self::Rsa(self::rsa::SigningKey::from_pkcs8_der(der).context(RsaSnafu)?)
            }
            Algorithm::Ecdsa => {
                Self::Ecdsa(self::ecdsa::SigningKey::from_pkcs8_der(der).context(EcdsaSnafu)?)
            }
        };

        Ok(key)
    }

    /// Serializes the key as an unencrypted PKCS#8 document.
    pub fn to_der(&self) -> Result<SecretDocument> {
        match self {
            Self::Ed25519(key) => key.to_pkcs8_der().context(Ed25519Snafu),
            Self::Rsa(key) => key.to_pkcs8_der().context(RsaSnafu),
            Self::Ecdsa(key) => key.to_pkcs8_der().context(EcdsaSnafu),
        }
    }

    /// Serializes the key as a `PRIVATE KEY` PEM block, preceded by an
    /// informational preamble.
    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        let der = self.to_der()?;

        let preamble = match self {
            Self::Ed25519(key) => pem_text(Some(&key.seed()), None),
            _ => pem_text(Some(self.public_key().to_der()?.as_bytes()), None),
        };

        Ok(Zeroizing::new(encode_block(
            &preamble,
            PRIVATE_KEY_LABEL,
            der.as_bytes(),
        )))
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            Self::Rsa(key) => PublicKey::Rsa(key.verifying_key()),
            Self::Ecdsa(key) => PublicKey::Ecdsa(key.verifying_key()),
        }
    }

    /// See [`CertificateKeypair::validate`]. RSA keys additionally run the
    /// internal consistency check of the [`rsa`] crate.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Ed25519(key) => key.validate().context(Ed25519Snafu),
            Self::Rsa(key) => key.validate().context(RsaSnafu),
            Self::Ecdsa(key) => key.validate().context(EcdsaSnafu),
        }
    }

    /// Signs `message`. RSA and ECDSA sign its SHA-256 digest, Ed25519 signs
    /// the message itself.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Ed25519(key) => key.sign(message).context(Ed25519Snafu),
            Self::Rsa(key) => key.sign(message).context(RsaSnafu),
            Self::Ecdsa(key) => key.sign(message).context(EcdsaSnafu),
        }
    }
}

impl From<ed25519::SigningKey> for PrivateKey {
    fn from(key: ed25519::SigningKey) -> Self {
        Self::Ed25519(key)
    }
}

impl From<self::rsa::SigningKey> for PrivateKey {
    fn from(key: self::rsa::SigningKey) -> Self {
        Self::Rsa(key)
    }
}

impl From<self::ecdsa::SigningKey> for PrivateKey {
    fn from(key: self::ecdsa::SigningKey) -> Self {
        Self::Ecdsa(key)
    }
}

impl Keypair for PrivateKey {
    type VerifyingKey = PublicKey;

    fn verifying_key(&self) -> Self::VerifyingKey {
        self.public_key()
    }
}

impl DynSignatureAlgorithmIdentifier for PrivateKey {
    fn signature_algorithm_identifier(&self) -> x509_cert::spki::Result<AlgorithmIdentifierOwned> {
        Ok(match self {
            Self::Ed25519(_) => ed25519::SigningKey::signature_algorithm_identifier(),
            Self::Rsa(_) => self::rsa::SigningKey::signature_algorithm_identifier(),
            Self::Ecdsa(_) => self::ecdsa::SigningKey::signature_algorithm_identifier(),
        })
    }
}

impl Signer<KeySignature> for PrivateKey {
    fn try_sign(&self, message: &[u8]) -> Result<KeySignature, signature::Error> {
        self.sign(message)
            .map(KeySignature)
            .map_err(signature::Error::from_source)
    }
}

/// Raw signature bytes as produced by [`PrivateKey::sign`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySignature(Vec<u8>);

impl KeySignature {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl SignatureBitStringEncoding for KeySignature {
    fn to_bitstring(&self) -> x509_cert::der::Result<BitString> {
        BitString::from_bytes(&self.0)
    }
}

/// A public key of any supported [`Algorithm`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    Rsa(RsaPublicKey),
    Ecdsa(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ed25519(_) => Algorithm::Ed25519,
            Self::Rsa(_) => Algorithm::Rsa,
            Self::Ecdsa(_) => Algorithm::Ecdsa,
        }
    }

    /// The size of the key in bits. For RSA this is the size of the modulus.
    pub fn key_size(&self) -> usize {
        match self {
            Self::Ed25519(_) => ed25519::SigningKey::key_size(),
            Self::Rsa(key) => key.n().bits(),
            Self::Ecdsa(_) => self::ecdsa::SigningKey::key_size(),
        }
    }

    /// Parses a PKIX SubjectPublicKeyInfo. The variant is chosen by the
    /// algorithm identifier inside the structure.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let spki = SubjectPublicKeyInfoRef::try_from(der).context(DecodePublicKeyInfoSnafu)?;
        let curve = spki.algorithm.parameters_oid().ok();
        let algorithm = Algorithm::from_key_algorithm(spki.algorithm.oid, curve)?;

        let key = match algorithm {
            Algorithm::Ed25519 => Self::Ed25519(
                ed25519_dalek::VerifyingKey::from_public_key_der(der)
                    .context(DecodePublicKeySnafu { algorithm })?,
            ),
            Algorithm::Rsa => Self::Rsa(
                RsaPublicKey::from_public_key_der(der)
                    .context(DecodePublicKeySnafu { algorithm })?,
            ),
            Algorithm::Ecdsa => Self::Ecdsa(
                p256::ecdsa::VerifyingKey::from_public_key_der(der)
                    .context(DecodePublicKeySnafu { algorithm })?,
            ),
        };

        Ok(key)
    }

    /// Extracts the public key embedded in a certificate.
    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = x509_cert::der::Encode::to_der(spki).map_err(x509_cert::spki::Error::from);
        Self::from_der(&der.context(DecodePublicKeyInfoSnafu)?)
    }

    /// Serializes the key as a PKIX SubjectPublicKeyInfo.
    pub fn to_der(&self) -> Result<Document> {
        self.to_public_key_der().context(EncodePublicKeySnafu {
            algorithm: self.algorithm(),
        })
    }

    /// Serializes the key as a `PUBLIC KEY` PEM block, preceded by an
    /// informational preamble.
    pub fn to_pem(&self) -> Result<String> {
        let der = self.to_der()?;
        let preamble = pem_text(Some(der.as_bytes()), None);

        Ok(encode_block(&preamble, PUBLIC_KEY_LABEL, der.as_bytes()))
    }

    /// Serializes an RSA key in the legacy PKCS#1 `RSAPublicKey` form. All
    /// other algorithms fail.
    pub fn to_pkcs1_der(&self) -> Result<Document> {
        match self {
            Self::Rsa(key) => key.to_pkcs1_der().context(EncodePkcs1Snafu),
            _ => NotAnRsaKeySnafu {
                algorithm: self.algorithm(),
            }
            .fail(),
        }
    }

    /// Verifies a signature produced by [`PrivateKey::sign`] over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let algorithm = self.algorithm();

        match self {
            Self::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .context(VerifySignatureSnafu { algorithm })?;
                key.verify_strict(message, &signature)
                    .context(VerifySignatureSnafu { algorithm })
            }
            Self::Rsa(key) => key
                .verify(
                    Pkcs1v15Sign::new::<Sha256>(),
                    &Sha256::digest(message),
                    signature,
                )
                .context(VerifyRsaSignatureSnafu),
            Self::Ecdsa(key) => {
                let signature = p256::ecdsa::Signature::from_der(signature)
                    .context(VerifySignatureSnafu { algorithm })?;
                key.verify(message, &signature)
                    .context(VerifySignatureSnafu { algorithm })
            }
        }
    }
}

impl EncodePublicKey for PublicKey {
    fn to_public_key_der(&self) -> x509_cert::spki::Result<Document> {
        match self {
            Self::Ed25519(key) => key.to_public_key_der(),
            Self::Rsa(key) => key.to_public_key_der(),
            Self::Ecdsa(key) => key.to_public_key_der(),
        }
    }
}
