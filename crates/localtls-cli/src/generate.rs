use localtls::{create_credentials, credentials, keys};
use snafu::{ResultExt, Snafu};

use crate::CredentialArguments;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create credentials"))]
    CreateCredentials { source: credentials::Error },

    #[snafu(display("failed to encode the leaf private key"))]
    EncodeLeafKey { source: keys::Error },
}

/// Prints the leaf certificate, the leaf key and the CA certificate. The CA
/// key is not printed and therefore lost.
pub fn run(arguments: &CredentialArguments) -> Result<(), Error> {
    let credentials = create_credentials(
        arguments.algorithm,
        &arguments.canonical_name,
        &arguments.ips_and_domains,
    )
    .context(CreateCredentialsSnafu)?;

    let leaf_key = credentials.leaf_key.to_pem().context(EncodeLeafKeySnafu)?;

    print!("{}", credentials.leaf_certificate.to_pem());
    print!("{}", leaf_key.as_str());
    print!("{}", credentials.ca_certificate.to_pem());

    Ok(())
}
