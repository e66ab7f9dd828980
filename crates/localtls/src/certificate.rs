//! A thin wrapper around the DER encoding of a signed X.509 certificate.
use std::{net::IpAddr, time::Duration};

use jiff::Timestamp;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use x509_cert::{
    der::{Decode, Encode, Tag, Tagged},
    ext::pkix::{SubjectAltName, name::GeneralName},
    name::Name,
    time::Time,
};

use crate::{
    keys::{self, PublicKey},
    pem::{CERTIFICATE_LABEL, encode_block, pem_text},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse X.509 certificate"))]
    Parse { source: x509_cert::der::Error },

    #[snafu(display("failed to encode the to-be-signed part of the certificate"))]
    EncodeTbsCertificate { source: x509_cert::der::Error },

    #[snafu(display("failed to extract the public key embedded in the certificate"))]
    ExtractPublicKey { source: keys::Error },

    #[snafu(display("the certificate signature is not byte aligned"))]
    UnalignedSignature,

    #[snafu(display(
        "the certificate was issued by {issuer:?}, not by the candidate parent {parent:?}"
    ))]
    IssuerMismatch { issuer: String, parent: String },

    #[snafu(display("the certificate signature does not verify under the parent's public key"))]
    VerifySignature { source: keys::Error },

    #[snafu(display("failed to decode the subject alternative names"))]
    DecodeSubjectAltName { source: x509_cert::der::Error },

    #[snafu(display("the certificate contains an IP address of invalid length {length}"))]
    InvalidIpAddress { length: usize },

    #[snafu(display("the certificate validity is outside the supported time range"))]
    ConvertValidity { source: jiff::Error },

    #[snafu(display("the timestamp {timestamp} lies before 1970 and cannot be encoded"))]
    TimeBeforeEpoch { timestamp: Timestamp },

    #[snafu(display("failed to encode the timestamp {timestamp} as X.509 time"))]
    EncodeTime {
        source: x509_cert::der::Error,
        timestamp: Timestamp,
    },
}

/// The DER encoding of a signed X.509 certificate.
///
/// The DER is the canonical form. The expanded [`x509_cert::Certificate`] is
/// computed on demand by [`Certificate::parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wraps `der` after checking that it parses as an X.509 certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = der.into();
        x509_cert::Certificate::from_der(&der).context(ParseSnafu)?;

        Ok(Self { der })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Serializes the certificate as a `CERTIFICATE` PEM block, preceded by
    /// its SHA-256 and SHA-1 fingerprints.
    pub fn to_pem(&self) -> String {
        let preamble = pem_text(Some(&self.der), Some(&self.der));
        encode_block(&preamble, CERTIFICATE_LABEL, &self.der)
    }

    pub fn parse(&self) -> Result<x509_cert::Certificate> {
        x509_cert::Certificate::from_der(&self.der).context(ParseSnafu)
    }

    /// The public key embedded in the certificate.
    pub fn public_key(&self) -> Result<PublicKey> {
        let certificate = self.parse()?;
        PublicKey::from_spki(&certificate.tbs_certificate.subject_public_key_info)
            .context(ExtractPublicKeySnafu)
    }

    /// Returns the notBefore and notAfter bounds of the certificate.
    pub fn validity(&self) -> Result<(Timestamp, Timestamp)> {
        let validity = self.parse()?.tbs_certificate.validity;

        Ok((
            to_timestamp(validity.not_before)?,
            to_timestamp(validity.not_after)?,
        ))
    }

    /// Returns the DNS names and IP addresses of the subject alternative name
    /// extension, each in the order they appear in the certificate.
    pub fn subject_alt_names(&self) -> Result<(Vec<String>, Vec<IpAddr>)> {
        let certificate = self.parse()?;
        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();

        let Some((_, san)) = certificate
            .tbs_certificate
            .get::<SubjectAltName>()
            .context(DecodeSubjectAltNameSnafu)?
        else {
            return Ok((dns_names, ip_addresses));
        };

        for name in san.0 {
            match name {
                GeneralName::DnsName(dns_name) => dns_names.push(dns_name.to_string()),
                GeneralName::IpAddress(ip) => ip_addresses.push(ip_address(ip.as_bytes())?),
                _ => {}
            }
        }

        Ok((dns_names, ip_addresses))
    }

    /// Verifies that this certificate was issued by `parent`: the issuer name
    /// must equal the parent's subject and the signature must verify under
    /// the parent's public key.
    pub fn check_signature_from(&self, parent: &Self) -> Result<()> {
        let certificate = self.parse()?;
        let parent_certificate = parent.parse()?;

        ensure!(
            certificate.tbs_certificate.issuer == parent_certificate.tbs_certificate.subject,
            IssuerMismatchSnafu {
                issuer: certificate.tbs_certificate.issuer.to_string(),
                parent: parent_certificate.tbs_certificate.subject.to_string(),
            }
        );

        let tbs = certificate
            .tbs_certificate
            .to_der()
            .context(EncodeTbsCertificateSnafu)?;
        let signature = certificate
            .signature
            .as_bytes()
            .context(UnalignedSignatureSnafu)?;

        parent
            .public_key()?
            .verify(&tbs, signature)
            .context(VerifySignatureSnafu)
    }
}

/// Returns the first common name attribute of `name`, if any.
pub fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|attribute| attribute.oid == const_oid::db::rfc4519::CN)
        .and_then(|attribute| match attribute.value.tag() {
            Tag::Utf8String | Tag::PrintableString | Tag::Ia5String => {
                std::str::from_utf8(attribute.value.value())
                    .ok()
                    .map(ToOwned::to_owned)
            }
            _ => None,
        })
}

fn to_timestamp(time: Time) -> Result<Timestamp> {
    let duration = time.to_unix_duration();
    Timestamp::from_second(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
        .context(ConvertValiditySnafu)
}

fn ip_address(bytes: &[u8]) -> Result<IpAddr> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::from(octets));
    }

    let octets = <[u8; 16]>::try_from(bytes).ok().context(InvalidIpAddressSnafu {
        length: bytes.len(),
    })?;

    Ok(IpAddr::from(octets))
}

/// Converts a [`Timestamp`] into an X.509 [`Time`], using UTCTime for years
/// up to 2049 and GeneralizedTime afterwards (RFC 5280, section 4.1.2.5).
///
/// Timestamps before the Unix epoch cannot be encoded and are rejected.
pub(crate) fn to_x509_time(timestamp: Timestamp) -> Result<Time> {
    let seconds = u64::try_from(timestamp.as_second())
        .ok()
        .context(TimeBeforeEpochSnafu { timestamp })?;
    let duration = Duration::from_secs(seconds);

    match x509_cert::der::asn1::UtcTime::from_unix_duration(duration) {
        Ok(utc_time) => Ok(Time::UtcTime(utc_time)),
        Err(_) => x509_cert::der::asn1::GeneralizedTime::from_unix_duration(duration)
            .map(Time::GeneralTime)
            .context(EncodeTimeSnafu { timestamp }),
    }
}
