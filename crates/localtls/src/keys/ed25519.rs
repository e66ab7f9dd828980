//! Abstraction layer around the [`ed25519_dalek`] crate. This module provides
//! types which abstract away the generation of Ed25519 keys used for signing
//! of CAs and other certificates.
//!
//! Keys are serialized as version 1 PKCS#8 documents which contain only the
//! 32-byte seed. Version 2 documents, which additionally embed the public
//! key, are accepted on input.
use ed25519_dalek::pkcs8::KeypairBytes;
use pkcs8::{DecodePrivateKey, EncodePrivateKey, SecretDocument};
use rand_core::CryptoRngCore;
use signature::{Signer, Verifier};
use snafu::{ResultExt, Snafu, ensure};
use tracing::instrument;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::{
    algorithm::Algorithm,
    keys::{CertificateKeypair, SELF_CHECK_MESSAGE},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize the Ed25519 signing key as PKCS8 DER"))]
    SerializeKey { source: pkcs8::Error },

    #[snafu(display("failed to deserialize the Ed25519 signing key from PKCS8 DER"))]
    DeserializeKey { source: pkcs8::Error },

    #[snafu(display("the Ed25519 verifying key is a weak point of small order"))]
    WeakVerifyingKey,

    #[snafu(display("failed to sign message with Ed25519 key"))]
    Sign { source: signature::Error },

    #[snafu(display("the Ed25519 key failed to verify its own signature"))]
    SelfCheck { source: signature::Error },
}

#[derive(Debug)]
pub struct SigningKey(ed25519_dalek::SigningKey);

impl SigningKey {
    /// Returns the 32-byte seed the key pair is derived from.
    pub fn seed(&self) -> [u8; ed25519_dalek::SECRET_KEY_LENGTH] {
        self.0.to_bytes()
    }

    /// Returns the 64-byte seed and public key composite.
    pub fn keypair_bytes(&self) -> [u8; ed25519_dalek::KEYPAIR_LENGTH] {
        self.0.to_keypair_bytes()
    }
}

impl CertificateKeypair for SigningKey {
    type Error = Error;
    type VerifyingKey = ed25519_dalek::VerifyingKey;

    const ALGORITHM: Algorithm = Algorithm::Ed25519;

    #[instrument(name = "create_ed25519_signing_key_custom_rng", skip_all)]
    fn new_with_rng<Rng>(rng: &mut Rng) -> Result<Self>
    where
        Rng: CryptoRngCore + Sized,
    {
        Ok(Self(ed25519_dalek::SigningKey::generate(rng)))
    }

    fn verifying_key(&self) -> Self::VerifyingKey {
        self.0.verifying_key()
    }

    #[instrument(name = "create_ed25519_signing_key_from_pkcs8_der", skip_all)]
    fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let signing_key =
            ed25519_dalek::SigningKey::from_pkcs8_der(der).context(DeserializeKeySnafu)?;

        Ok(Self(signing_key))
    }

    fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        let keypair_bytes = KeypairBytes {
            secret_key: self.0.to_bytes(),
            public_key: None,
        };

        keypair_bytes.to_pkcs8_der().context(SerializeKeySnafu)
    }

    fn validate(&self) -> Result<()> {
        let verifying_key = self.0.verifying_key();
        ensure!(!verifying_key.is_weak(), WeakVerifyingKeySnafu);

        let signature = self
            .0
            .try_sign(SELF_CHECK_MESSAGE)
            .context(SignSnafu)?;
        verifying_key
            .verify(SELF_CHECK_MESSAGE, &signature)
            .context(SelfCheckSnafu)
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self.0.try_sign(message).context(SignSnafu)?;
        Ok(signature.to_bytes().to_vec())
    }

    fn signature_algorithm_identifier() -> AlgorithmIdentifierOwned {
        // RFC 8410, section 3: the parameters MUST be absent.
        AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc8410::ID_ED_25519,
            parameters: None,
        }
    }

    fn key_size() -> usize {
        256
    }
}
