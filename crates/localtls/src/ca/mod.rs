//! Contains types and functions to generate self-signed certificate
//! authorities (CAs) and to sign leaf certificates with them.
//!
//! ```no_run
//! use localtls::{algorithm::Algorithm, ca::CertificateAuthority, keys::PrivateKey};
//! use localtls::template::CertificateTemplate;
//!
//! let ca = CertificateAuthority::new_self_signed("", Algorithm::Ecdsa).unwrap();
//! let leaf_key = PrivateKey::new(Algorithm::Ecdsa).unwrap();
//! let template = CertificateTemplate::default().ensure_server().unwrap();
//!
//! let leaf = ca
//!     .validate()
//!     .unwrap()
//!     .sign(&template, &leaf_key.public_key())
//!     .unwrap();
//! ```
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, instrument};
use x509_cert::{
    builder::{Builder, CertificateBuilder, Profile},
    der::{Decode, Encode, asn1::Ia5String, referenced::OwnedToRef},
    ext::pkix::{
        AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, SubjectAltName,
        SubjectKeyIdentifier, name::GeneralName,
    },
    spki::SubjectPublicKeyInfoOwned,
    time::Validity,
};

use crate::{
    algorithm::Algorithm,
    certificate::{self, Certificate, to_x509_time},
    keys::{self, KeySignature, PrivateKey, PublicKey},
    template::{self, CertificateTemplate},
};

mod consts;
pub use consts::*;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Defines all error variants which can occur when creating a CA or signing
/// certificates with it.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create signing key pair"))]
    CreateSigningKeyPair { source: keys::Error },

    #[snafu(display("failed to fill the certificate authority template"))]
    FillTemplate { source: template::Error },

    #[snafu(display("the certificate template has no {field}, apply a template policy first"))]
    IncompleteTemplate { field: &'static str },

    #[snafu(display("failed to encode the validity window"))]
    EncodeValidity { source: certificate::Error },

    #[snafu(display("failed to encode the subject name"))]
    EncodeSubject { source: template::Error },

    #[snafu(display("failed to encode the subject public key"))]
    EncodePublicKey { source: keys::Error },

    #[snafu(display("failed to decode SPKI from DER"))]
    DecodeSpki { source: x509_cert::der::Error },

    #[snafu(display("failed to derive key identifier"))]
    DeriveKeyIdentifier { source: x509_cert::der::Error },

    #[snafu(display(
        "failed to parse subject alternative DNS name \"{subject_alternative_dns_name}\" as a Ia5 string"
    ))]
    ParseSubjectAlternativeDnsName {
        subject_alternative_dns_name: String,
        source: x509_cert::der::Error,
    },

    #[snafu(display("failed to create certificate builder"))]
    CreateCertificateBuilder { source: x509_cert::builder::Error },

    #[snafu(display("failed to add certificate extension"))]
    AddCertificateExtension { source: x509_cert::builder::Error },

    #[snafu(display("failed to build certificate"))]
    BuildCertificate { source: x509_cert::builder::Error },

    #[snafu(display("failed to encode certificate as DER"))]
    EncodeCertificate { source: x509_cert::der::Error },

    #[snafu(display("failed to wrap the signed certificate"))]
    WrapCertificate { source: certificate::Error },

    #[snafu(display("the private key of the certificate authority is invalid"))]
    InvalidPrivateKey { source: keys::Error },

    #[snafu(display("the certificate of the certificate authority is invalid"))]
    InvalidCertificate { source: certificate::Error },

    #[snafu(display(
        "the public key embedded in the CA certificate does not belong to the CA private key"
    ))]
    KeyMismatch,
}

/// A self-signed certificate authority (CA) which is used to sign leaf
/// certificates.
///
/// A CA has to be validated with [`CertificateAuthority::validate`] before it
/// can sign anything.
#[derive(Debug)]
pub struct CertificateAuthority {
    certificate: Certificate,
    private_key: PrivateKey,
}

impl CertificateAuthority {
    /// Creates a new CA with a fresh private key of the given `algorithm`.
    ///
    /// The CA name defaults to `<hostname>ca-<YYMMDD>`. A non-empty
    /// `canonical_name` replaces it, in which case it becomes the subject of
    /// the CA and the issuer of every certificate it signs.
    #[instrument(name = "create_self_signed_certificate_authority")]
    pub fn new_self_signed(canonical_name: &str, algorithm: Algorithm) -> Result<Self> {
        let private_key = PrivateKey::new(algorithm).context(CreateSigningKeyPairSnafu)?;

        let mut template = CertificateTemplate::default();
        if !canonical_name.is_empty() {
            template.issuer.common_name = Some(canonical_name.to_owned());
        }
        let template = template.ensure_self_signed().context(FillTemplateSnafu)?;

        let certificate =
            build_certificate(&template, &private_key.public_key(), &private_key, None)?;

        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// Assembles a CA from a previously created certificate and its private
    /// key, e.g. after reading both from disk.
    pub fn from_parts(certificate: Certificate, private_key: PrivateKey) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn into_parts(self) -> (Certificate, PrivateKey) {
        (self.certificate, self.private_key)
    }

    /// Checks that the private key is intact, the certificate parses and the
    /// public key embedded in the certificate belongs to the private key.
    pub fn validate(&self) -> Result<ValidatedCertificateAuthority<'_>> {
        self.private_key.validate().context(InvalidPrivateKeySnafu)?;

        let certificate = self.certificate.parse().context(InvalidCertificateSnafu)?;
        let embedded_key = self
            .certificate
            .public_key()
            .context(InvalidCertificateSnafu)?;
        ensure!(embedded_key == self.private_key.public_key(), KeyMismatchSnafu);

        Ok(ValidatedCertificateAuthority {
            ca: self,
            certificate,
        })
    }
}

/// A [`CertificateAuthority`] which passed [`CertificateAuthority::validate`].
#[derive(Debug)]
pub struct ValidatedCertificateAuthority<'a> {
    ca: &'a CertificateAuthority,
    certificate: x509_cert::Certificate,
}

impl ValidatedCertificateAuthority<'_> {
    /// The expanded CA certificate.
    pub fn parsed_certificate(&self) -> &x509_cert::Certificate {
        &self.certificate
    }

    /// Issues a certificate for `public_key` described by `template`.
    ///
    /// The template is used as is. Callers are expected to fill it with
    /// [`CertificateTemplate::ensure_server`] or
    /// [`CertificateTemplate::ensure_client`] first.
    #[instrument(name = "sign_certificate", skip_all)]
    pub fn sign(
        &self,
        template: &CertificateTemplate,
        public_key: &PublicKey,
    ) -> Result<Certificate> {
        build_certificate(
            template,
            public_key,
            &self.ca.private_key,
            Some(&self.certificate),
        )
    }
}

/// Builds and signs a certificate for `public_key`. Without a `parent` the
/// certificate is self-signed.
fn build_certificate(
    template: &CertificateTemplate,
    public_key: &PublicKey,
    signer: &PrivateKey,
    parent: Option<&x509_cert::Certificate>,
) -> Result<Certificate> {
    let serial_number = template
        .serial_number
        .clone()
        .context(IncompleteTemplateSnafu {
            field: "serial number",
        })?;
    let not_before = template.not_before.context(IncompleteTemplateSnafu {
        field: "notBefore",
    })?;
    let not_after = template.not_after.context(IncompleteTemplateSnafu {
        field: "notAfter",
    })?;

    let validity = Validity {
        not_before: to_x509_time(not_before).context(EncodeValiditySnafu)?,
        not_after: to_x509_time(not_after).context(EncodeValiditySnafu)?,
    };
    let subject = template.subject.to_name().context(EncodeSubjectSnafu)?;

    let spki_der = public_key.to_der().context(EncodePublicKeySnafu)?;
    let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).context(DecodeSpkiSnafu)?;

    // Key identifiers follow RFC 5280, section 4.2.1.2, method 1: the 160-bit
    // SHA-1 hash of the subject public key. CAs get a SubjectKeyIdentifier,
    // signed certificates an AuthorityKeyIdentifier pointing at their parent.
    let ski = match parent {
        None => Some(
            SubjectKeyIdentifier::try_from(spki.owned_to_ref())
                .context(DeriveKeyIdentifierSnafu)?,
        ),
        Some(_) => None,
    };
    let aki = parent
        .map(|parent| {
            AuthorityKeyIdentifier::try_from(
                parent.tbs_certificate.subject_public_key_info.owned_to_ref(),
            )
        })
        .transpose()
        .context(DeriveKeyIdentifierSnafu)?;

    let san_dns = template.dns_names.iter().map(|dns_name| {
        Ok(GeneralName::DnsName(Ia5String::new(dns_name).with_context(
            |_| ParseSubjectAlternativeDnsNameSnafu {
                subject_alternative_dns_name: dns_name.clone(),
            },
        )?))
    });
    let san_ips = template
        .ip_addresses
        .iter()
        .copied()
        .map(GeneralName::from)
        .map(Result::Ok);
    let sans = san_dns.chain(san_ips).collect::<Result<Vec<_>>>()?;

    let issuer = parent.map(|parent| parent.tbs_certificate.subject.clone());

    debug!(
        certificate.subject = %subject,
        certificate.issuer = %issuer.as_ref().unwrap_or(&subject),
        certificate.not_after = %validity.not_after,
        certificate.not_before = %validity.not_before,
        certificate.serial = %serial_number,
        certificate.is_ca = template.is_ca,
        certificate.san.dns_names = ?template.dns_names,
        certificate.san.ip_addresses = ?template.ip_addresses,
        certificate.public_key.algorithm = %public_key.algorithm(),
        certificate.public_key.size = public_key.key_size(),
        certificate.signed_by.algorithm = %signer.algorithm(),
        "creating and signing certificate"
    );

    // The manual profile adds no extensions on its own, the template decides
    // about every one of them.
    let mut builder = CertificateBuilder::new(
        Profile::Manual { issuer },
        serial_number,
        validity,
        subject,
        spki,
        signer,
    )
    .context(CreateCertificateBuilderSnafu)?;

    if template.basic_constraints_valid {
        builder
            .add_extension(&BasicConstraints {
                ca: template.is_ca,
                path_len_constraint: None,
            })
            .context(AddCertificateExtensionSnafu)?;
    }

    if !template.key_usage.0.is_empty() {
        builder
            .add_extension(&template.key_usage)
            .context(AddCertificateExtensionSnafu)?;
    }

    if !template.ext_key_usage.is_empty() {
        let usages = template.ext_key_usage.iter().map(|usage| usage.oid());
        builder
            .add_extension(&ExtendedKeyUsage(usages.collect()))
            .context(AddCertificateExtensionSnafu)?;
    }

    if let Some(ski) = &ski {
        builder
            .add_extension(ski)
            .context(AddCertificateExtensionSnafu)?;
    }

    if let Some(aki) = &aki {
        builder
            .add_extension(aki)
            .context(AddCertificateExtensionSnafu)?;
    }

    if !sans.is_empty() {
        builder
            .add_extension(&SubjectAltName(sans))
            .context(AddCertificateExtensionSnafu)?;
    }

    let certificate = builder
        .build::<KeySignature>()
        .context(BuildCertificateSnafu)?;
    let der = certificate.to_der().context(EncodeCertificateSnafu)?;

    Certificate::from_der(der).context(WrapCertificateSnafu)
}

#[cfg(test)]
mod tests {
    use const_oid::db::rfc5280::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH};
    use jiff::{ToSpan, tz::TimeZone};
    use rstest::rstest;
    use x509_cert::ext::pkix::KeyUsage;

    use super::*;
    use crate::{certificate::common_name, host, template::ExtKeyUsage};

    #[rstest]
    #[case(Algorithm::Ed25519)]
    #[case(Algorithm::Rsa)]
    #[case(Algorithm::Ecdsa)]
    fn self_signed_ca(#[case] algorithm: Algorithm) {
        let ca = CertificateAuthority::new_self_signed("", algorithm).unwrap();
        let validated = ca.validate().unwrap();
        let tbs = &validated.parsed_certificate().tbs_certificate;

        assert_eq!(tbs.issuer, tbs.subject);
        assert_eq!(
            common_name(&tbs.subject),
            Some(host::default_ca_common_name().unwrap())
        );
        assert_eq!(ca.certificate().public_key().unwrap().algorithm(), algorithm);

        ca.certificate()
            .check_signature_from(ca.certificate())
            .unwrap();

        let (_, basic_constraints) = tbs.get::<BasicConstraints>().unwrap().unwrap();
        assert!(basic_constraints.ca);
        let (_, key_usage) = tbs.get::<KeyUsage>().unwrap().unwrap();
        assert!(key_usage.key_cert_sign());
        assert!(key_usage.crl_sign());
        assert!(tbs.get::<SubjectKeyIdentifier>().unwrap().is_some());
    }

    #[test]
    fn canonical_name_replaces_default_name() {
        let ca = CertificateAuthority::new_self_signed("myca", Algorithm::Ecdsa).unwrap();
        let tbs = ca.certificate().parse().unwrap().tbs_certificate;

        assert_eq!(common_name(&tbs.subject).as_deref(), Some("myca"));
        assert_eq!(common_name(&tbs.issuer).as_deref(), Some("myca"));
    }

    #[test]
    fn validity_window_shape() {
        let ca = CertificateAuthority::new_self_signed("", Algorithm::Ed25519).unwrap();
        let (not_before, not_after) = ca.certificate().validity().unwrap();
        let not_before = not_before.to_zoned(TimeZone::UTC);

        assert_eq!(not_before.time(), jiff::civil::Time::midnight());
        assert_eq!(
            not_after,
            not_before
                .checked_add(10.years())
                .unwrap()
                .checked_sub(1.minute())
                .unwrap()
                .timestamp()
        );
    }

    #[test]
    fn signs_server_certificate() {
        let ca = CertificateAuthority::new_self_signed("", Algorithm::Ecdsa).unwrap();
        let leaf_key = PrivateKey::new(Algorithm::Ed25519).unwrap();
        let template = CertificateTemplate {
            dns_names: vec!["svc.example".to_owned()],
            ip_addresses: vec!["10.0.0.1".parse().unwrap()],
            ext_key_usage: vec![ExtKeyUsage::ClientAuth],
            ..Default::default()
        }
        .ensure_server()
        .unwrap();

        let leaf = ca
            .validate()
            .unwrap()
            .sign(&template, &leaf_key.public_key())
            .unwrap();
        leaf.check_signature_from(ca.certificate()).unwrap();
        assert_eq!(leaf.public_key().unwrap(), leaf_key.public_key());

        let tbs = leaf.parse().unwrap().tbs_certificate;
        let (_, basic_constraints) = tbs.get::<BasicConstraints>().unwrap().unwrap();
        assert!(!basic_constraints.ca);
        let (_, usages) = tbs.get::<ExtendedKeyUsage>().unwrap().unwrap();
        assert_eq!(usages.0, vec![ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH]);
        assert!(tbs.get::<AuthorityKeyIdentifier>().unwrap().is_some());

        let (dns_names, ip_addresses) = leaf.subject_alt_names().unwrap();
        assert_eq!(dns_names, ["svc.example"]);
        assert_eq!(ip_addresses, ["10.0.0.1".parse::<std::net::IpAddr>().unwrap()]);
    }

    #[test]
    fn rejects_unfilled_template() {
        let ca = CertificateAuthority::new_self_signed("", Algorithm::Ed25519).unwrap();
        let leaf_key = PrivateKey::new(Algorithm::Ed25519).unwrap();

        let result = ca
            .validate()
            .unwrap()
            .sign(&CertificateTemplate::default(), &leaf_key.public_key());
        assert!(matches!(
            result,
            Err(Error::IncompleteTemplate {
                field: "serial number"
            })
        ));
    }

    #[test]
    fn rejects_validity_before_epoch() {
        let ca = CertificateAuthority::new_self_signed("", Algorithm::Ed25519).unwrap();
        let leaf_key = PrivateKey::new(Algorithm::Ed25519).unwrap();
        let template = CertificateTemplate {
            not_before: Some("1960-01-01T00:00:00Z".parse().unwrap()),
            ..Default::default()
        }
        .ensure_server()
        .unwrap();

        let result = ca
            .validate()
            .unwrap()
            .sign(&template, &leaf_key.public_key());
        assert!(matches!(
            result,
            Err(Error::EncodeValidity {
                source: certificate::Error::TimeBeforeEpoch { .. }
            })
        ));
    }

    #[test]
    fn rejects_mismatched_key() {
        let ca = CertificateAuthority::new_self_signed("", Algorithm::Ed25519).unwrap();
        let (certificate, _) = ca.into_parts();
        let other_key = PrivateKey::new(Algorithm::Ed25519).unwrap();

        let ca = CertificateAuthority::from_parts(certificate, other_key);
        assert!(matches!(ca.validate(), Err(Error::KeyMismatch)));
    }
}
