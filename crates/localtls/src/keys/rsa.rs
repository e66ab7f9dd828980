//! Abstraction layer around the [`rsa`] crate. This module provides types
//! which abstract away the generation of RSA keys used for signing of CAs
//! and other certificates.
//!
//! Signatures use PKCS#1 v1.5 padding over a SHA-256 digest. Signing is
//! blinded with [`OsRng`].
use pkcs8::{DecodePrivateKey, EncodePrivateKey, SecretDocument};
use rand_core::{CryptoRngCore, OsRng};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu};
use tracing::instrument;
use x509_cert::{
    der::{Any, asn1::AnyRef},
    spki::AlgorithmIdentifierOwned,
};

use crate::{
    algorithm::Algorithm,
    ca::RSA_KEY_SIZE,
    keys::{CertificateKeypair, SELF_CHECK_MESSAGE},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create RSA key with a {key_size}-bit modulus"))]
    CreateKey { source: rsa::Error, key_size: usize },

    #[snafu(display("failed to serialize the RSA signing key as PKCS8 DER"))]
    SerializeKey { source: pkcs8::Error },

    #[snafu(display("failed to deserialize the RSA signing key from PKCS8 DER"))]
    DeserializeKey { source: pkcs8::Error },

    #[snafu(display("the RSA key failed its internal consistency check"))]
    Inconsistent { source: rsa::Error },

    #[snafu(display("failed to sign message with RSA key"))]
    Sign { source: rsa::Error },

    #[snafu(display("the RSA key failed to verify its own signature"))]
    SelfCheck { source: rsa::Error },
}

#[derive(Debug)]
pub struct SigningKey(RsaPrivateKey);

impl SigningKey {
    /// Generates a new RSA key with a custom modulus size in bits.
    ///
    /// It should be noted that the generation of the key takes longer for
    /// larger key sizes. Most callers want [`CertificateKeypair::new`], which
    /// uses the default size of [`RSA_KEY_SIZE`].
    #[instrument(name = "create_rsa_signing_key_with_size", skip(rng))]
    pub fn new_with_size<Rng>(rng: &mut Rng, key_size: usize) -> Result<Self>
    where
        Rng: CryptoRngCore + Sized,
    {
        let private_key = RsaPrivateKey::new(rng, key_size).context(CreateKeySnafu { key_size })?;
        Ok(Self(private_key))
    }
}

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type VerifyingKey = RsaPublicKey;

    const ALGORITHM: Algorithm = Algorithm::Rsa;

    /// Generates a new RSA key with a custom random-number generator.
    ///
    /// It should be noted that the generation of the key takes longer for
    /// larger key sizes. A 2048-bit key takes a fraction of a second in
    /// optimized builds, but can take multiple seconds in debug builds.
    #[instrument(name = "create_rsa_signing_key_custom_rng", skip_all)]
    fn new_with_rng<Rng>(rng: &mut Rng) -> Result<Self>
    where
        Rng: CryptoRngCore + Sized,
    {
        Self::new_with_size(rng, RSA_KEY_SIZE)
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        self.0.to_public_key()
    }

    #[instrument(name = "create_rsa_signing_key_from_pkcs8_der", skip_all)]
    fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_der(der).context(DeserializeKeySnafu)?;
        Ok(Self(private_key))
    }

    fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        self.0.to_pkcs8_der().context(SerializeKeySnafu)
    }

    fn validate(&self) -> Result<()> {
        self.0.validate().context(InconsistentSnafu)?;

        let digest = Sha256::digest(SELF_CHECK_MESSAGE);
        let signature = self
            .0
            .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
            .context(SignSnafu)?;

        self.0
            .to_public_key()
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .context(SelfCheckSnafu)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha256::digest(message);
        self.0
            .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
            .context(SignSnafu)
    }

    fn signature_algorithm_identifier() -> AlgorithmIdentifierOwned {
        // RFC 4055, section 5: the parameters MUST be NULL.
        AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(Any::from(AnyRef::NULL)),
        }
    }

    fn key_size() -> usize {
        RSA_KEY_SIZE
    }
}

#[cfg(test)]
mod tests {
    use rsa::traits::PublicKeyParts;

    use super::*;

    #[test]
    fn default_modulus_size() {
        let key = SigningKey::new().unwrap();
        assert_eq!(key.verifying_key().n().bits(), RSA_KEY_SIZE);
    }

    #[test]
    fn pkcs8_round_trip() {
        let key = SigningKey::new_with_size(&mut OsRng, 1024).unwrap();
        let der = key.to_pkcs8_der().unwrap();

        let parsed = SigningKey::from_pkcs8_der(der.as_bytes()).unwrap();
        assert_eq!(parsed.verifying_key(), key.verifying_key());
        assert_eq!(parsed.to_pkcs8_der().unwrap().as_bytes(), der.as_bytes());
    }

    #[test]
    fn signs_and_validates() {
        let key = SigningKey::new_with_size(&mut OsRng, 1024).unwrap();
        key.validate().unwrap();

        let signature = key.sign(b"HELLO").unwrap();
        assert_eq!(signature.len(), 1024 / 8);
    }
}
