use std::path::{Path, PathBuf};

use localtls::{Certificate, PemObject, certificate, pem, read_pem_from_file};
use snafu::{OptionExt, ResultExt, Snafu};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read {path:?}"))]
    ReadPem { source: pem::Error, path: PathBuf },

    #[snafu(display("file {path:?} does not exist"))]
    FileNotFound { path: PathBuf },

    #[snafu(display("failed to determine the key algorithm"))]
    Algorithm { source: certificate::Error },

    #[snafu(display("failed to parse the certificate"))]
    ParseCertificate { source: certificate::Error },
}

pub fn run(path: &Path) -> Result<()> {
    let object = read_pem_from_file(path)
        .context(ReadPemSnafu { path })?
        .context(FileNotFoundSnafu { path })?;

    let algorithm = object.algorithm().context(AlgorithmSnafu)?;
    println!("type:      {}", object.label());
    println!("algorithm: {algorithm}");

    match &object {
        PemObject::Certificate(certificate) => print_certificate(certificate)?,
        PemObject::PrivateKey(private_key) => {
            println!("key size:  {}", private_key.public_key().key_size());
        }
        PemObject::PublicKey(public_key) => {
            println!("key size:  {}", public_key.key_size());
        }
    }

    Ok(())
}

fn print_certificate(certificate: &Certificate) -> Result<()> {
    let parsed = certificate.parse().context(ParseCertificateSnafu)?;
    let (not_before, not_after) = certificate.validity().context(ParseCertificateSnafu)?;
    let (dns_names, ip_addresses) = certificate
        .subject_alt_names()
        .context(ParseCertificateSnafu)?;

    println!("subject:   {}", parsed.tbs_certificate.subject);
    println!("issuer:    {}", parsed.tbs_certificate.issuer);
    println!("serial:    {}", parsed.tbs_certificate.serial_number);
    println!("not before {not_before}");
    println!("not after  {not_after}");

    for dns_name in dns_names {
        println!("DNS:       {dns_name}");
    }
    for ip_address in ip_addresses {
        println!("IP:        {ip_address}");
    }

    Ok(())
}
