use std::path::{Path, PathBuf};

use clap::Args;
use localtls::{CacheLayout, PemObject, cache, pem, read_or_create_credentials, read_pem_from_file};
use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::CredentialArguments;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read or create the cached credentials"))]
    ReadOrCreate { source: cache::Error },

    #[snafu(display("failed to determine the cache layout"))]
    Layout { source: cache::Error },

    #[snafu(display("failed to read the CA certificate"))]
    ReadCaCertificate { source: pem::Error },

    #[snafu(display("expected a certificate in {path:?}"))]
    NotACertificate { path: PathBuf },

    #[snafu(display("failed to create DER export directory {path:?}"))]
    CreateExportDirectory {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write DER file {path:?}"))]
    WriteDer {
        source: std::io::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct ProvisionArguments {
    /// The application the credentials belong to. It names the CA files and
    /// the default cache directory.
    #[arg(long, env = "LOCALTLS_APP_NAME", default_value = "localtls")]
    pub app_name: String,

    /// The cache directory. Defaults to the application's directory in the
    /// user's configuration directory.
    #[arg(long, env = "LOCALTLS_DIR")]
    pub dir: Option<PathBuf>,

    /// Additionally export the leaf and CA certificates as DER files into this
    /// directory.
    #[arg(long, value_name = "DIR")]
    pub der: Option<PathBuf>,

    #[command(flatten)]
    pub credentials: CredentialArguments,
}

pub fn run(arguments: &ProvisionArguments) -> Result<()> {
    let ProvisionArguments {
        app_name,
        dir,
        der,
        credentials,
    } = arguments;

    let leaf = read_or_create_credentials(
        app_name,
        dir.as_deref(),
        credentials.algorithm,
        &credentials.canonical_name,
        &credentials.ips_and_domains,
    )
    .context(ReadOrCreateSnafu)?;

    let layout = CacheLayout::new(app_name, dir.as_deref()).context(LayoutSnafu)?;
    for path in layout.paths() {
        println!("{}", path.display());
    }

    if let Some(der_dir) = der {
        let Some(PemObject::Certificate(ca_certificate)) =
            read_pem_from_file(&layout.ca_certificate).context(ReadCaCertificateSnafu)?
        else {
            return NotACertificateSnafu {
                path: &layout.ca_certificate,
            }
            .fail();
        };

        std::fs::create_dir_all(der_dir).context(CreateExportDirectorySnafu { path: der_dir })?;
        write_der(&der_dir.join("cert.der"), leaf.certificate.der())?;
        write_der(&der_dir.join("ca.der"), ca_certificate.der())?;
    }

    Ok(())
}

fn write_der(path: &Path, der: &[u8]) -> Result<()> {
    std::fs::write(path, der).context(WriteDerSnafu { path })?;
    info!(path = %path.display(), "exported certificate as DER");
    println!("{}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use localtls::{Algorithm, Certificate};

    use super::*;

    #[test]
    fn provision_exports_der() {
        let cache_dir = tempfile::tempdir().unwrap();
        let der_dir = cache_dir.path().join("der");

        let arguments = ProvisionArguments {
            app_name: "app".to_owned(),
            dir: Some(cache_dir.path().to_owned()),
            der: Some(der_dir.clone()),
            credentials: CredentialArguments {
                algorithm: Algorithm::Ecdsa,
                canonical_name: String::new(),
                ips_and_domains: Vec::new(),
            },
        };
        run(&arguments).unwrap();

        let leaf = Certificate::from_der(std::fs::read(der_dir.join("cert.der")).unwrap()).unwrap();
        let ca = Certificate::from_der(std::fs::read(der_dir.join("ca.der")).unwrap()).unwrap();
        leaf.check_signature_from(&ca).unwrap();
    }
}
