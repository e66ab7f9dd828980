//! Encoding and decoding of single PEM blocks.
//!
//! Every PEM document emitted by this crate contains exactly one block of
//! type `CERTIFICATE`, `PRIVATE KEY` or `PUBLIC KEY`, preceded by a few
//! informational lines produced by [`pem_text`]. Parsers ignore everything
//! outside the block.
use std::{fmt::Write, path::Path};

use jiff::Timestamp;
use pem::{EncodeConfig, LineEnding, Pem};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu, ensure};
use tracing::instrument;

use crate::{
    algorithm::Algorithm,
    certificate::{self, Certificate},
    keys::{self, PrivateKey, PublicKey},
};

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Accepted on input only. The content is parsed as a PKIX
/// SubjectPublicKeyInfo, just like [`PUBLIC_KEY_LABEL`].
pub const LEGACY_RSA_PUBLIC_KEY_LABEL: &str = "RSA PUBLIC KEY";

/// Number of digest bytes shown in a fingerprint line.
const FINGERPRINT_LENGTH: usize = 4;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("no PEM block found"))]
    NoPemBlock,

    #[snafu(display("failed to decode PEM block"))]
    DecodePem { source: pem::PemError },

    #[snafu(display("unknown PEM block type {label:?}"))]
    UnknownBlockType { label: String },

    #[snafu(display("failed to parse PEM block as certificate"))]
    ParseCertificate { source: certificate::Error },

    #[snafu(display("failed to parse PEM block as private key"))]
    ParsePrivateKey { source: keys::Error },

    #[snafu(display("failed to parse PEM block as public key"))]
    ParsePublicKey { source: keys::Error },

    #[snafu(display("failed to read PEM file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: std::path::PathBuf,
    },
}

/// The decoded content of a PEM document.
#[derive(Debug)]
pub enum PemObject {
    Certificate(Certificate),
    PrivateKey(PrivateKey),
    PublicKey(PublicKey),
}

impl PemObject {
    /// The PEM label this object is emitted with.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Certificate(_) => CERTIFICATE_LABEL,
            Self::PrivateKey(_) => PRIVATE_KEY_LABEL,
            Self::PublicKey(_) => PUBLIC_KEY_LABEL,
        }
    }

    /// The key algorithm of the object. For certificates this is the
    /// algorithm of the embedded public key.
    pub fn algorithm(&self) -> Result<Algorithm, certificate::Error> {
        match self {
            Self::Certificate(certificate) => Ok(certificate.public_key()?.algorithm()),
            Self::PrivateKey(key) => Ok(key.algorithm()),
            Self::PublicKey(key) => Ok(key.algorithm()),
        }
    }
}

/// Builds the informational preamble placed in front of emitted PEM blocks.
///
/// `sha256_data` and `sha1_data` are the inputs of the two fingerprint
/// lines. A missing input suppresses its line.
pub fn pem_text(sha256_data: Option<&[u8]>, sha1_data: Option<&[u8]>) -> String {
    let mut text = format!(
        "Generated on {} by {} {}\n",
        Timestamp::now().strftime("%Y-%m-%dT%H:%M:%SZ"),
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    text.push_str("Copyright the localtls developers, licensed under Apache-2.0\n");

    if let Some(data) = sha256_data {
        let digest = Sha256::digest(data);
        text.push_str(&format!(
            "sha256 fingerprint: {}\n",
            fingerprint(&digest)
        ));
    }

    if let Some(data) = sha1_data {
        let digest = Sha1::digest(data);
        text.push_str(&format!(
            "sha1   fingerprint: {}\n",
            fingerprint(&digest)
        ));
    }

    text
}

fn fingerprint(digest: &[u8]) -> String {
    digest
        .iter()
        .take(FINGERPRINT_LENGTH)
        .fold(String::new(), |mut hex, byte| {
            // Writing to a String never fails
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

/// Appends a single PEM block with `label` and `der` as content to
/// `preamble`.
pub(crate) fn encode_block(preamble: &str, label: &str, der: &[u8]) -> String {
    let block = pem::encode_config(
        &Pem::new(label, der),
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    );

    format!("{preamble}{block}")
}

/// Decodes the first PEM block in `text` and parses its content according to
/// the block type.
///
/// Text before the block and any further blocks are ignored.
pub fn parse_pem(text: &str) -> Result<PemObject> {
    ensure!(text.contains("-----BEGIN "), NoPemBlockSnafu);
    let block = pem::parse(text).context(DecodePemSnafu)?;

    match block.tag() {
        CERTIFICATE_LABEL => Certificate::from_der(block.contents())
            .map(PemObject::Certificate)
            .context(ParseCertificateSnafu),
        PRIVATE_KEY_LABEL => PrivateKey::from_der(block.contents())
            .map(PemObject::PrivateKey)
            .context(ParsePrivateKeySnafu),
        PUBLIC_KEY_LABEL | LEGACY_RSA_PUBLIC_KEY_LABEL => PublicKey::from_der(block.contents())
            .map(PemObject::PublicKey)
            .context(ParsePublicKeySnafu),
        label => UnknownBlockTypeSnafu { label }.fail(),
    }
}

/// Reads `path` and parses its first PEM block.
///
/// Returns `Ok(None)` if the file does not exist. Every other read or parse
/// failure is an error.
#[instrument(name = "read_pem_from_file", skip_all, fields(path = %path.as_ref().display()))]
pub fn read_pem_from_file(path: impl AsRef<Path>) -> Result<Option<PemObject>> {
    let path = path.as_ref();

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).context(ReadFileSnafu { path }),
    };

    parse_pem(&text).map(Some)
}
