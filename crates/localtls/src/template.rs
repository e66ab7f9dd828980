//! Certificate templates and the policies which fill them up to what modern
//! TLS clients require.
//!
//! A [`CertificateTemplate`] describes a certificate before it is signed. The
//! `ensure_*` methods consume a template and return it with every missing
//! field filled in. Fields which are already set are left untouched and key
//! usages are only ever added, so applying a policy twice yields the same
//! template as applying it once.
//!
//! ```no_run
//! use localtls::template::{CertificateTemplate, ExtKeyUsage};
//!
//! let template = CertificateTemplate {
//!     dns_names: vec!["localhost".to_owned()],
//!     ..Default::default()
//! }
//! .ensure_server()
//! .unwrap();
//!
//! assert!(template.ext_key_usage.contains(&ExtKeyUsage::ServerAuth));
//! ```
use std::net::IpAddr;

use const_oid::{
    ObjectIdentifier,
    db::{
        rfc4519::{C, CN},
        rfc5280::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH},
    },
};
use jiff::{Timestamp, ToSpan, tz::TimeZone};
use snafu::{ResultExt, Snafu};
use x509_cert::{
    attr::AttributeTypeAndValue,
    der::{
        Any, Tag,
        asn1::{PrintableStringRef, SetOfVec},
    },
    ext::pkix::{KeyUsage, KeyUsages},
    name::{Name, RdnSequence, RelativeDistinguishedName},
    serial_number::SerialNumber,
};

use crate::{
    ca::{DEFAULT_COUNTRY, DEFAULT_VALIDITY_YEARS, VALIDITY_MARGIN_MINUTES},
    host,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to determine the default name"))]
    DefaultName { source: host::Error },

    #[snafu(display("failed to encode serial number"))]
    EncodeSerialNumber { source: x509_cert::der::Error },

    #[snafu(display("failed to compute the validity window"))]
    ComputeValidity { source: jiff::Error },

    #[snafu(display("failed to encode {attribute} attribute {value:?}"))]
    EncodeAttribute {
        source: x509_cert::der::Error,
        attribute: &'static str,
        value: String,
    },
}

/// The subset of an X.509 distinguished name this crate works with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: Option<String>,
    pub country: Option<String>,
}

impl DistinguishedName {
    /// Encodes the name as an X.509 [`Name`]. The country is encoded as a
    /// PrintableString, the common name as a UTF8String.
    pub fn to_name(&self) -> Result<Name> {
        let mut rdns = Vec::new();

        if let Some(country) = non_empty(self.country.as_deref()) {
            let value = PrintableStringRef::new(country)
                .and_then(|_| Any::new(Tag::PrintableString, country.as_bytes()))
                .and_then(|value| attribute(C, value))
                .context(EncodeAttributeSnafu {
                    attribute: "country",
                    value: country,
                })?;
            rdns.push(value);
        }

        if let Some(common_name) = non_empty(self.common_name.as_deref()) {
            let value = Any::new(Tag::Utf8String, common_name.as_bytes())
                .and_then(|value| attribute(CN, value))
                .context(EncodeAttributeSnafu {
                    attribute: "common name",
                    value: common_name,
                })?;
            rdns.push(value);
        }

        Ok(RdnSequence(rdns))
    }
}

fn attribute(
    oid: ObjectIdentifier,
    value: Any,
) -> x509_cert::der::Result<RelativeDistinguishedName> {
    let attribute = AttributeTypeAndValue { oid, value };
    Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![attribute])?))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Extended key usages a template can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtKeyUsage {
    ServerAuth,
    ClientAuth,
}

impl ExtKeyUsage {
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Self::ServerAuth => ID_KP_SERVER_AUTH,
            Self::ClientAuth => ID_KP_CLIENT_AUTH,
        }
    }
}

/// Describes a certificate before it is signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateTemplate {
    pub serial_number: Option<SerialNumber>,
    pub subject: DistinguishedName,

    /// Only consulted by [`CertificateTemplate::ensure_self_signed`], which
    /// derives the subject of a CA from it. Signed certificates always carry
    /// the subject of their parent as issuer.
    pub issuer: DistinguishedName,

    pub not_before: Option<Timestamp>,
    pub not_after: Option<Timestamp>,

    /// Whether the BasicConstraints extension is included.
    pub basic_constraints_valid: bool,
    pub is_ca: bool,

    pub key_usage: KeyUsage,
    pub ext_key_usage: Vec<ExtKeyUsage>,

    pub ip_addresses: Vec<IpAddr>,
    pub dns_names: Vec<String>,
}

impl Default for CertificateTemplate {
    fn default() -> Self {
        Self {
            serial_number: None,
            subject: DistinguishedName::default(),
            issuer: DistinguishedName::default(),
            not_before: None,
            not_after: None,
            basic_constraints_valid: false,
            is_ca: false,
            key_usage: KeyUsage(Default::default()),
            ext_key_usage: Vec::new(),
            ip_addresses: Vec::new(),
            dns_names: Vec::new(),
        }
    }
}

impl CertificateTemplate {
    /// Fills the fields every certificate needs: serial number, subject
    /// common name and country, validity window and basic constraints.
    ///
    /// The serial number is a fresh random 128-bit value, the common name is
    /// the short hostname and the validity starts at midnight UTC today and
    /// lasts ten years minus one minute.
    pub fn ensure_template(mut self) -> Result<Self> {
        if self.serial_number.is_none() {
            self.serial_number = Some(random_serial_number()?);
        }

        if non_empty(self.subject.common_name.as_deref()).is_none() {
            self.subject.common_name = Some(host::short_hostname().context(DefaultNameSnafu)?);
        }

        if non_empty(self.subject.country.as_deref()).is_none() {
            self.subject.country = Some(DEFAULT_COUNTRY.to_owned());
        }

        let not_before = match self.not_before {
            Some(not_before) => not_before,
            None => midnight_utc_today()?,
        };
        self.not_before = Some(not_before);

        if self.not_after.is_none() {
            self.not_after = Some(default_not_after(not_before)?);
        }

        self.basic_constraints_valid = true;
        Ok(self)
    }

    /// Turns the template into one for a self-signed CA.
    ///
    /// The issuer common name defaults to `<hostname>ca-<YYMMDD>`. If the
    /// subject has no country, the subject is copied from the issuer. The
    /// template is marked as CA and may sign certificates and CRLs.
    pub fn ensure_self_signed(mut self) -> Result<Self> {
        if non_empty(self.issuer.common_name.as_deref()).is_none() {
            self.issuer.common_name =
                Some(host::default_ca_common_name().context(DefaultNameSnafu)?);
        }

        if non_empty(self.issuer.country.as_deref()).is_none() {
            self.issuer.country = Some(DEFAULT_COUNTRY.to_owned());
        }

        if non_empty(self.subject.country.as_deref()).is_none() {
            self.subject = self.issuer.clone();
        }

        self.is_ca = true;
        self.key_usage.0 |= KeyUsages::KeyCertSign | KeyUsages::CRLSign;

        self.ensure_template()
    }

    /// Turns the template into one for a TLS server certificate.
    pub fn ensure_server(self) -> Result<Self> {
        self.ensure_leaf(ExtKeyUsage::ServerAuth)
    }

    /// Turns the template into one for a TLS client certificate.
    pub fn ensure_client(self) -> Result<Self> {
        self.ensure_leaf(ExtKeyUsage::ClientAuth)
    }

    fn ensure_leaf(self, usage: ExtKeyUsage) -> Result<Self> {
        let mut template = self.ensure_template()?;
        template.key_usage.0 |= KeyUsages::DigitalSignature;

        if !template.ext_key_usage.contains(&usage) {
            template.ext_key_usage.push(usage);
        }

        Ok(template)
    }
}

/// Draws a fresh positive 128-bit serial number.
fn random_serial_number() -> Result<SerialNumber> {
    // RFC 5280 requires a positive serial, zero is not allowed
    let serial = rand::random::<u128>().max(1);
    SerialNumber::new(&serial.to_be_bytes()).context(EncodeSerialNumberSnafu)
}

fn midnight_utc_today() -> Result<Timestamp> {
    let midnight = Timestamp::now()
        .to_zoned(TimeZone::UTC)
        .start_of_day()
        .context(ComputeValiditySnafu)?;

    Ok(midnight.timestamp())
}

fn default_not_after(not_before: Timestamp) -> Result<Timestamp> {
    let not_after = not_before
        .to_zoned(TimeZone::UTC)
        .checked_add(DEFAULT_VALIDITY_YEARS.years())
        .and_then(|end| end.checked_sub(VALIDITY_MARGIN_MINUTES.minutes()))
        .context(ComputeValiditySnafu)?;

    Ok(not_after.timestamp())
}
