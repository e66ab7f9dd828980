//! One-call assembly of a CA and a server certificate signed by it.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, instrument};

use crate::{
    algorithm::Algorithm,
    ca::{self, CertificateAuthority},
    certificate::Certificate,
    keys::{self, PrivateKey},
    template::{self, CertificateTemplate},
};

/// IP addresses a leaf is issued for when no addresses are given.
pub const DEFAULT_IP_ADDRESSES: [IpAddr; 2] = [
    IpAddr::V4(Ipv4Addr::LOCALHOST),
    IpAddr::V6(Ipv6Addr::LOCALHOST),
];

/// DNS names a leaf is issued for when no addresses are given.
pub const DEFAULT_DNS_NAMES: [&str; 1] = ["localhost"];

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("entry {position} of the address list is empty"))]
    EmptyAddress { position: usize },

    #[snafu(display("failed to create certificate authority"))]
    CreateCertificateAuthority { source: ca::Error },

    #[snafu(display("failed to validate certificate authority"))]
    ValidateCertificateAuthority { source: ca::Error },

    #[snafu(display("failed to create leaf private key"))]
    CreateLeafKey { source: keys::Error },

    #[snafu(display("failed to fill the leaf certificate template"))]
    FillTemplate { source: template::Error },

    #[snafu(display("failed to sign leaf certificate"))]
    SignLeafCertificate { source: ca::Error },
}

/// A CA and a leaf certificate signed by it, together with both private
/// keys.
///
/// Only the leaf certificate and key are needed to run a TLS server. The CA
/// certificate is what clients install as trust anchor.
#[derive(Debug)]
pub struct Credentials {
    pub leaf_certificate: Certificate,
    pub leaf_key: PrivateKey,
    pub ca_certificate: Certificate,
    pub ca_key: PrivateKey,
}

/// Creates a fresh CA and a server certificate signed by it, both using
/// `algorithm`.
///
/// Every entry of `ips_and_domains` which parses as an IP address ends up as
/// IP address in the subject alternative names, every other entry as DNS
/// name, each in the order given. An empty entry is an error. Without any
/// entries the leaf is issued for `127.0.0.1`, `::1` and `localhost`.
///
/// A non-empty `canonical_name` replaces the default CA name, see
/// [`CertificateAuthority::new_self_signed`].
#[instrument(name = "create_credentials", skip(ips_and_domains))]
pub fn create_credentials(
    algorithm: Algorithm,
    canonical_name: &str,
    ips_and_domains: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<Credentials> {
    let template = address_template(ips_and_domains)?;

    let ca = CertificateAuthority::new_self_signed(canonical_name, algorithm)
        .context(CreateCertificateAuthoritySnafu)?;

    let (leaf_certificate, leaf_key) = {
        let validated_ca = ca.validate().context(ValidateCertificateAuthoritySnafu)?;
        let leaf_key = PrivateKey::new(algorithm).context(CreateLeafKeySnafu)?;
        let template = template.ensure_server().context(FillTemplateSnafu)?;

        let leaf_certificate = validated_ca
            .sign(&template, &leaf_key.public_key())
            .context(SignLeafCertificateSnafu)?;

        (leaf_certificate, leaf_key)
    };

    let (ca_certificate, ca_key) = ca.into_parts();

    Ok(Credentials {
        leaf_certificate,
        leaf_key,
        ca_certificate,
        ca_key,
    })
}

fn address_template(
    ips_and_domains: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<CertificateTemplate> {
    let mut template = CertificateTemplate::default();

    for (index, entry) in ips_and_domains.into_iter().enumerate() {
        let entry = entry.as_ref();

        if let Ok(ip_address) = entry.parse::<IpAddr>() {
            template.ip_addresses.push(ip_address);
        } else {
            ensure!(!entry.is_empty(), EmptyAddressSnafu {
                position: index + 1
            });
            template.dns_names.push(entry.to_owned());
        }
    }

    if template.ip_addresses.is_empty() && template.dns_names.is_empty() {
        debug!("no addresses given, issuing for localhost");
        template.ip_addresses = DEFAULT_IP_ADDRESSES.to_vec();
        template.dns_names = DEFAULT_DNS_NAMES.map(ToOwned::to_owned).to_vec();
    }

    Ok(template)
}

/// Creates RSA credentials for localhost.
///
/// This is meant for tests and panics on error, use [`create_credentials`]
/// everywhere else.
pub fn create_rsa() -> Credentials {
    create_credentials(Algorithm::Rsa, "", [""; 0]).expect("failed to create RSA credentials")
}

/// Creates Ed25519 credentials for localhost.
///
/// This is meant for tests and panics on error, use [`create_credentials`]
/// everywhere else.
pub fn create_ed25519() -> Credentials {
    create_credentials(Algorithm::Ed25519, "", [""; 0])
        .expect("failed to create Ed25519 credentials")
}
