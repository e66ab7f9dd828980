//! A write-through filesystem cache which provides a stable set of
//! credentials per host and application.
//!
//! The cache directory holds four PEM files, with `H` being the short
//! hostname:
//!
//! - `H-cert.pem`: the leaf certificate
//! - `H-key.pem`: the leaf private key
//! - `<app>-ca.pem`: the CA certificate
//! - `<app>-ca-key.pem`: the CA private key
//!
//! Files are created read-only for their owner and never modified in place.
//! Renewal is a manual operation: delete the files and they are recreated on
//! the next call.
use std::{
    io::Write,
    path::{Path, PathBuf},
};

use snafu::{OptionExt, ResultExt, Snafu};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::{
    algorithm::Algorithm,
    certificate::Certificate,
    credentials::{self, Credentials, create_credentials},
    host,
    keys::{self, PrivateKey},
    pem::{self, PemObject, read_pem_from_file},
};

/// File mode of all created files, read-only for the owner.
#[cfg(unix)]
const FILE_MODE: u32 = 0o400;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to determine the short hostname"))]
    Hostname { source: host::Error },

    #[snafu(display("the user configuration directory is unknown on this platform"))]
    NoConfigDir,

    #[snafu(display("failed to read cached credentials"))]
    ReadFile { source: pem::Error },

    #[snafu(display("expected a {expected} in {path:?}, found a {found}"))]
    UnexpectedContent {
        path: PathBuf,
        expected: &'static str,
        found: &'static str,
    },

    #[snafu(display("failed to create credentials"))]
    CreateCredentials { source: credentials::Error },

    #[snafu(display("failed to serialize private key for {path:?}"))]
    SerializePrivateKey { source: keys::Error, path: PathBuf },

    #[snafu(display("failed to check whether {path:?} exists"))]
    CheckFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to create directory {path:?}"))]
    CreateDirectory {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to write file {path:?}"))]
    WriteFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to set permissions of file {path:?}"))]
    SetPermissions {
        source: std::io::Error,
        path: PathBuf,
    },
}

/// The paths of the four files of a credential cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheLayout {
    pub leaf_certificate: PathBuf,
    pub leaf_key: PathBuf,
    pub ca_certificate: PathBuf,
    pub ca_key: PathBuf,
}

impl CacheLayout {
    /// Returns the layout for `app_name` on this host.
    ///
    /// Without a `dir` (or with an empty one) the files live in
    /// `<config dir>/<app_name>`, e.g. `~/.config/<app_name>` on Linux.
    pub fn new(app_name: &str, dir: Option<&Path>) -> Result<Self> {
        let dir = match dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_owned(),
            _ => Self::default_dir(app_name)?,
        };
        let hostname = host::short_hostname().context(HostnameSnafu)?;

        Ok(Self::in_dir(&dir, app_name, &hostname))
    }

    pub fn in_dir(dir: &Path, app_name: &str, hostname: &str) -> Self {
        Self {
            leaf_certificate: dir.join(format!("{hostname}-cert.pem")),
            leaf_key: dir.join(format!("{hostname}-key.pem")),
            ca_certificate: dir.join(format!("{app_name}-ca.pem")),
            ca_key: dir.join(format!("{app_name}-ca-key.pem")),
        }
    }

    pub fn default_dir(app_name: &str) -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context(NoConfigDirSnafu)?;
        Ok(config_dir.join(app_name))
    }

    /// All four paths in the order they are written.
    pub fn paths(&self) -> [&Path; 4] {
        [
            &self.leaf_certificate,
            &self.leaf_key,
            &self.ca_certificate,
            &self.ca_key,
        ]
    }
}

/// The leaf half of [`Credentials`], which is all a TLS server needs.
#[derive(Debug)]
pub struct LeafCredentials {
    pub certificate: Certificate,
    pub private_key: PrivateKey,
}

impl From<Credentials> for LeafCredentials {
    fn from(credentials: Credentials) -> Self {
        Self {
            certificate: credentials.leaf_certificate,
            private_key: credentials.leaf_key,
        }
    }
}

/// Reads the cached leaf certificate and key of `app_name`, creating and
/// caching a fresh set of credentials if either of them is missing.
///
/// See [`create_credentials`] for the meaning of `algorithm`,
/// `canonical_name` and `ips_and_domains`. They are only used when new
/// credentials are created. See [`CacheLayout::new`] for `dir`.
///
/// Concurrent callers may both create credentials, the last writer wins.
#[instrument(name = "read_or_create_credentials", skip(ips_and_domains))]
pub fn read_or_create_credentials(
    app_name: &str,
    dir: Option<&Path>,
    algorithm: Algorithm,
    canonical_name: &str,
    ips_and_domains: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<LeafCredentials> {
    let layout = CacheLayout::new(app_name, dir)?;

    if let Some(leaf) = read_leaf_credentials(&layout)? {
        debug!(
            path = %layout.leaf_certificate.display(),
            "using cached credentials"
        );
        return Ok(leaf);
    }

    info!("no cached credentials found, creating new ones");
    let credentials = create_credentials(algorithm, canonical_name, ips_and_domains)
        .context(CreateCredentialsSnafu)?;
    write_credentials(&layout, &credentials)?;

    Ok(credentials.into())
}

/// Returns `None` unless all four files exist. A cache missing any of them
/// was only partially written and has to be recreated as a whole.
fn read_leaf_credentials(layout: &CacheLayout) -> Result<Option<LeafCredentials>> {
    for path in layout.paths() {
        if !path.try_exists().context(CheckFileSnafu { path })? {
            debug!(path = %path.display(), "cache file is missing");
            return Ok(None);
        }
    }

    let certificate = read_pem_from_file(&layout.leaf_certificate).context(ReadFileSnafu)?;
    let private_key = read_pem_from_file(&layout.leaf_key).context(ReadFileSnafu)?;

    let (Some(certificate), Some(private_key)) = (certificate, private_key) else {
        return Ok(None);
    };

    let certificate = match certificate {
        PemObject::Certificate(certificate) => certificate,
        other => {
            return UnexpectedContentSnafu {
                path: &layout.leaf_certificate,
                expected: pem::CERTIFICATE_LABEL,
                found: other.label(),
            }
            .fail();
        }
    };

    let private_key = match private_key {
        PemObject::PrivateKey(private_key) => private_key,
        other => {
            return UnexpectedContentSnafu {
                path: &layout.leaf_key,
                expected: pem::PRIVATE_KEY_LABEL,
                found: other.label(),
            }
            .fail();
        }
    };

    Ok(Some(LeafCredentials {
        certificate,
        private_key,
    }))
}

/// Writes all four files in the order leaf certificate, leaf key, CA
/// certificate, CA key. The first failure aborts.
fn write_credentials(layout: &CacheLayout, credentials: &Credentials) -> Result<()> {
    if let Some(dir) = layout.leaf_certificate.parent() {
        std::fs::create_dir_all(dir).context(CreateDirectorySnafu { path: dir })?;
    }

    let leaf_key = credentials
        .leaf_key
        .to_pem()
        .context(SerializePrivateKeySnafu {
            path: &layout.leaf_key,
        })?;
    let ca_key = credentials
        .ca_key
        .to_pem()
        .context(SerializePrivateKeySnafu {
            path: &layout.ca_key,
        })?;

    write_read_only(
        &layout.leaf_certificate,
        credentials.leaf_certificate.to_pem().as_bytes(),
    )?;
    write_read_only(&layout.leaf_key, leaf_key.as_bytes())?;
    write_read_only(
        &layout.ca_certificate,
        credentials.ca_certificate.to_pem().as_bytes(),
    )?;
    write_read_only(&layout.ca_key, ca_key.as_bytes())?;

    Ok(())
}

/// Writes `contents` to a temporary file next to `path`, makes it read-only
/// and moves it over `path`. An existing file at `path` is replaced as a
/// whole, even if it is read-only.
fn write_read_only(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut file = NamedTempFile::new_in(dir).context(WriteFileSnafu { path })?;
    file.write_all(contents).context(WriteFileSnafu { path })?;
    file.as_file().sync_all().context(WriteFileSnafu { path })?;

    #[cfg(unix)]
    {
        use std::{fs::Permissions, os::unix::fs::PermissionsExt};

        file.as_file()
            .set_permissions(Permissions::from_mode(FILE_MODE))
            .context(SetPermissionsSnafu { path })?;
    }

    file.persist(path)
        .map_err(|err| err.error)
        .context(WriteFileSnafu { path })?;

    info!(path = %path.display(), "wrote credential file");
    Ok(())
}
