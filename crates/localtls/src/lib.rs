//! This crate manufactures X.509 credentials for bringing up TLS servers on
//! loopback or a developer host, without touching any external PKI. It
//! creates a self-signed certificate authority (CA) and a server certificate
//! signed by it, for Ed25519, RSA or ECDSA keys.
//!
//! Most callers use [`read_or_create_credentials`], which keeps a stable set
//! of credentials per host and application on disk:
//!
//! ```no_run
//! use localtls::{algorithm::Algorithm, read_or_create_credentials};
//!
//! let leaf = read_or_create_credentials("myapp", None, Algorithm::Ed25519, "", [""; 0])
//!     .expect("failed to provision credentials");
//! ```
//!
//! Credentials which are not cached are created by [`create_credentials`].
//! Both leave the certificate template policy to [`template`] and the signing
//! to [`ca`].
//!
//! ## Feature Flags
//!
//! The crate allows to selectively enable additional features using
//! different feature flags. Currently, these flags are supported:
//!
//! - `rustls`: This enables interoperability between this crates types
//!   and the certificate formats required by [`tokio_rustls`].
//!
//! ## References
//!
//! - <https://datatracker.ietf.org/doc/html/rfc5280>
//! - <https://datatracker.ietf.org/doc/html/rfc5958>
//! - <https://datatracker.ietf.org/doc/html/rfc7468>
pub mod algorithm;
pub mod ca;
pub mod cache;
pub mod certificate;
pub mod credentials;
pub mod host;
pub mod keys;
pub mod pem;
pub mod template;

#[cfg(feature = "rustls")]
pub mod tls;

pub use algorithm::Algorithm;
pub use cache::{CacheLayout, LeafCredentials, read_or_create_credentials};
pub use certificate::Certificate;
pub use credentials::{Credentials, create_credentials, create_ed25519, create_rsa};
pub use keys::{PrivateKey, PublicKey};
pub use pem::{PemObject, parse_pem, pem_text, read_pem_from_file};
