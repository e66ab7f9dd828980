//! Interoperability with [`tokio_rustls`], enabled by the `rustls` feature.
//!
//! A TLS server needs the leaf certificate and key, see
//! [`LeafCredentials::server_config`]. Clients trust the CA certificate, see
//! [`Credentials::client_config`].
use snafu::{ResultExt, Snafu};
use tokio_rustls::rustls::{
    ClientConfig, RootCertStore, ServerConfig,
    crypto::{CryptoProvider, ring::default_provider},
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    sign::CertifiedKey,
    version::{TLS12, TLS13},
};

use crate::{
    cache::LeafCredentials,
    certificate::Certificate,
    credentials::Credentials,
    keys::{self, PrivateKey},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to encode private key as DER"))]
    EncodePrivateKeyDer { source: keys::Error },

    #[snafu(display("failed to decode CertifiedKey from DER"))]
    DecodeCertifiedKeyFromDer { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to add the CA certificate as trust anchor"))]
    AddTrustAnchor { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to set safe TLS protocol versions"))]
    SetSafeTlsProtocolVersions { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to configure the server certificate"))]
    ConfigureServerCertificate { source: tokio_rustls::rustls::Error },
}

impl Certificate {
    pub fn certificate_der(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.der().to_vec())
    }
}

impl PrivateKey {
    pub fn private_key_der(&self) -> Result<PrivateKeyDer<'static>, keys::Error> {
        let doc = self.to_der()?;
        let der = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(doc.as_bytes().to_vec()));

        Ok(der)
    }
}

impl LeafCredentials {
    /// Combines the leaf certificate and key into a [`CertifiedKey`] for
    /// `provider`.
    pub fn certified_key(&self, provider: &CryptoProvider) -> Result<CertifiedKey> {
        certified_key(&self.certificate, &self.private_key, provider)
    }

    /// A server configuration presenting the leaf certificate, using the
    /// `ring` provider with TLS 1.2 and 1.3.
    pub fn server_config(&self) -> Result<ServerConfig> {
        server_config(&self.certificate, &self.private_key)
    }
}

impl Credentials {
    pub fn certified_key(&self, provider: &CryptoProvider) -> Result<CertifiedKey> {
        certified_key(&self.leaf_certificate, &self.leaf_key, provider)
    }

    pub fn server_config(&self) -> Result<ServerConfig> {
        server_config(&self.leaf_certificate, &self.leaf_key)
    }

    /// A trust store containing only the CA certificate.
    pub fn root_cert_store(&self) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();
        store
            .add(self.ca_certificate.certificate_der())
            .context(AddTrustAnchorSnafu)?;

        Ok(store)
    }

    /// A client configuration which trusts only the CA certificate.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let config = ClientConfig::builder_with_provider(default_provider().into())
            .with_protocol_versions(&[&TLS12, &TLS13])
            .context(SetSafeTlsProtocolVersionsSnafu)?
            .with_root_certificates(self.root_cert_store()?)
            .with_no_client_auth();

        Ok(config)
    }
}

fn certified_key(
    certificate: &Certificate,
    private_key: &PrivateKey,
    provider: &CryptoProvider,
) -> Result<CertifiedKey> {
    let private_key_der = private_key
        .private_key_der()
        .context(EncodePrivateKeyDerSnafu)?;

    CertifiedKey::from_der(
        vec![certificate.certificate_der()],
        private_key_der,
        provider,
    )
    .context(DecodeCertifiedKeyFromDerSnafu)
}

fn server_config(certificate: &Certificate, private_key: &PrivateKey) -> Result<ServerConfig> {
    let private_key_der = private_key
        .private_key_der()
        .context(EncodePrivateKeyDerSnafu)?;

    ServerConfig::builder_with_provider(default_provider().into())
        .with_protocol_versions(&[&TLS12, &TLS13])
        .context(SetSafeTlsProtocolVersionsSnafu)?
        .with_no_client_auth()
        .with_single_cert(vec![certificate.certificate_der()], private_key_der)
        .context(ConfigureServerCertificateSnafu)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{algorithm::Algorithm, credentials::create_credentials};

    #[rstest]
    #[case(Algorithm::Ed25519)]
    #[case(Algorithm::Rsa)]
    #[case(Algorithm::Ecdsa)]
    fn rustls_accepts_credentials(#[case] algorithm: Algorithm) {
        let credentials = create_credentials(algorithm, "", [""; 0]).unwrap();

        credentials.certified_key(&default_provider()).unwrap();
        credentials.server_config().unwrap();
        credentials.client_config().unwrap();
        assert_eq!(credentials.root_cert_store().unwrap().len(), 1);
    }
}
