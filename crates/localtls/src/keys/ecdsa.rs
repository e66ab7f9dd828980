//! Abstraction layer around the [`ecdsa`] crate. This module provides types
//! which abstract away the generation of ECDSA keys used for signing of CAs
//! and other certificates.
use ecdsa::der::Signature as DerSignature;
use p256::{NistP256, ecdsa::Signature};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, SecretDocument};
use rand_core::CryptoRngCore;
use signature::{Signer, Verifier};
use snafu::{ResultExt, Snafu};
use tracing::instrument;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::{
    algorithm::Algorithm,
    keys::{CertificateKeypair, SELF_CHECK_MESSAGE},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize the ECDSA signing key as PKCS8 DER"))]
    SerializeKey { source: pkcs8::Error },

    #[snafu(display("failed to deserialize the ECDSA signing key from PKCS8 DER"))]
    DeserializeKey { source: pkcs8::Error },

    #[snafu(display("failed to sign message with ECDSA key"))]
    Sign { source: signature::Error },

    #[snafu(display("the ECDSA key failed to verify its own signature"))]
    SelfCheck { source: signature::Error },
}

#[derive(Debug)]
pub struct SigningKey(p256::ecdsa::SigningKey);

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type VerifyingKey = p256::ecdsa::VerifyingKey;

    const ALGORITHM: Algorithm = Algorithm::Ecdsa;

    #[instrument(name = "create_ecdsa_signing_key_custom_rng", skip_all)]
    fn new_with_rng<Rng>(rng: &mut Rng) -> Result<Self>
    where
        Rng: CryptoRngCore + Sized,
    {
        let signing_key = p256::ecdsa::SigningKey::random(rng);
        Ok(Self(signing_key))
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        *self.0.verifying_key()
    }

    #[instrument(name = "create_ecdsa_signing_key_from_pkcs8_der", skip_all)]
    fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let signing_key =
            p256::ecdsa::SigningKey::from_pkcs8_der(der).context(DeserializeKeySnafu)?;

        Ok(Self(signing_key))
    }

    fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        self.0.to_pkcs8_der().context(SerializeKeySnafu)
    }

    fn validate(&self) -> Result<()> {
        let signature: Signature = self.0.try_sign(SELF_CHECK_MESSAGE).context(SignSnafu)?;

        self.0
            .verifying_key()
            .verify(SELF_CHECK_MESSAGE, &signature)
            .context(SelfCheckSnafu)
    }

    /// Signs the SHA-256 digest of `message`. X.509 carries ECDSA signatures
    /// as a DER-encoded `Ecdsa-Sig-Value`, so that is what is returned.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature: DerSignature<NistP256> = self.0.try_sign(message).context(SignSnafu)?;
        Ok(signature.as_bytes().to_vec())
    }

    fn signature_algorithm_identifier() -> AlgorithmIdentifierOwned {
        // RFC 5758, section 3.2: the parameters MUST be absent.
        AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
            parameters: None,
        }
    }

    fn key_size() -> usize {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkcs8_round_trip() {
        let key = SigningKey::new().unwrap();
        let der = key.to_pkcs8_der().unwrap();

        let parsed = SigningKey::from_pkcs8_der(der.as_bytes()).unwrap();
        assert_eq!(parsed.verifying_key(), key.verifying_key());
        assert_eq!(parsed.to_pkcs8_der().unwrap().as_bytes(), der.as_bytes());
    }

    #[test]
    fn signatures_are_der_encoded() {
        let key = SigningKey::new().unwrap();
        key.validate().unwrap();

        let signature = key.sign(b"HELLO").unwrap();
        let parsed = Signature::from_der(&signature).unwrap();
        key.verifying_key().verify(b"HELLO", &parsed).unwrap();
    }
}
