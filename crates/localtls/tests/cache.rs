use std::{fs, io, path::Path, time::SystemTime};

use localtls::{
    Algorithm, CacheLayout, Certificate, LeafCredentials, PemObject, cache,
    read_or_create_credentials, read_pem_from_file,
};

fn provision(dir: &Path) -> cache::Result<LeafCredentials> {
    read_or_create_credentials("app", Some(dir), Algorithm::Ed25519, "", [""; 0])
}

/// Returns `None` unless `path` holds a certificate.
fn read_certificate(path: &Path) -> Option<Certificate> {
    match read_pem_from_file(path) {
        Ok(Some(PemObject::Certificate(certificate))) => Some(certificate),
        _ => None,
    }
}

fn modification_times(layout: &CacheLayout) -> io::Result<Vec<SystemTime>> {
    layout
        .paths()
        .iter()
        .map(|path| fs::metadata(path)?.modified())
        .collect()
}

#[test]
fn creates_four_read_only_files() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new("app", Some(dir.path())).unwrap();

    provision(dir.path()).unwrap();

    for path in layout.paths() {
        assert!(path.exists(), "{path:?} is missing");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o400, "{path:?} has mode {mode:o}");
        }
    }

    // No temporary files are left behind
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 4);

    let leaf = read_certificate(&layout.leaf_certificate).unwrap();
    let ca = read_certificate(&layout.ca_certificate).unwrap();
    leaf.check_signature_from(&ca).unwrap();

    let Some(PemObject::PrivateKey(ca_key)) = read_pem_from_file(&layout.ca_key).unwrap() else {
        panic!("expected the CA private key");
    };
    assert_eq!(ca.public_key().unwrap(), ca_key.public_key());
}

#[test]
fn second_call_reads_cache() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new("app", Some(dir.path())).unwrap();

    let first = provision(dir.path()).unwrap();
    let contents: Vec<_> = layout.paths().map(|path| fs::read(path).unwrap()).to_vec();
    let times = modification_times(&layout).unwrap();

    let second = provision(dir.path()).unwrap();

    assert_eq!(first.certificate, second.certificate);
    assert_eq!(
        first.private_key.to_der().unwrap().as_bytes(),
        second.private_key.to_der().unwrap().as_bytes()
    );
    assert_eq!(
        layout.paths().map(|path| fs::read(path).unwrap()).to_vec(),
        contents
    );
    assert_eq!(modification_times(&layout).unwrap(), times);
}

#[test]
fn missing_leaf_key_regenerates_everything() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new("app", Some(dir.path())).unwrap();

    let first = provision(dir.path()).unwrap();
    let first_ca = read_certificate(&layout.ca_certificate).unwrap();
    fs::remove_file(&layout.leaf_key).unwrap();

    let second = provision(dir.path()).unwrap();

    assert_ne!(first.certificate, second.certificate);
    for path in layout.paths() {
        assert!(path.exists(), "{path:?} is missing");
    }

    let second_ca = read_certificate(&layout.ca_certificate).unwrap();
    assert_ne!(first_ca, second_ca);
    second.certificate.check_signature_from(&second_ca).unwrap();
    assert_eq!(read_certificate(&layout.leaf_certificate).unwrap(), second.certificate);
}

#[test]
fn missing_ca_files_regenerate_everything() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new("app", Some(dir.path())).unwrap();

    let first = provision(dir.path()).unwrap();
    fs::remove_file(&layout.ca_certificate).unwrap();
    fs::remove_file(&layout.ca_key).unwrap();

    let second = provision(dir.path()).unwrap();

    assert_ne!(first.certificate, second.certificate);
    for path in layout.paths() {
        assert!(path.exists(), "{path:?} is missing");
    }

    let ca = read_certificate(&layout.ca_certificate).unwrap();
    second.certificate.check_signature_from(&ca).unwrap();
    assert_eq!(read_certificate(&layout.leaf_certificate).unwrap(), second.certificate);
}

#[test]
fn missing_ca_key_regenerates_everything() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new("app", Some(dir.path())).unwrap();

    let first = provision(dir.path()).unwrap();
    fs::remove_file(&layout.ca_key).unwrap();

    let second = provision(dir.path()).unwrap();

    assert_ne!(first.certificate, second.certificate);
    assert!(layout.ca_key.exists());
}

#[test]
fn missing_leaf_certificate_regenerates_everything() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new("app", Some(dir.path())).unwrap();

    let first = provision(dir.path()).unwrap();
    fs::remove_file(&layout.leaf_certificate).unwrap();

    let second = provision(dir.path()).unwrap();

    assert_ne!(first.certificate, second.certificate);
    second
        .certificate
        .check_signature_from(&read_certificate(&layout.ca_certificate).unwrap())
        .unwrap();
}

#[test]
fn corrupt_cache_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let layout = CacheLayout::new("app", Some(dir.path())).unwrap();

    provision(dir.path()).unwrap();
    fs::remove_file(&layout.leaf_certificate).unwrap();
    fs::write(
        &layout.leaf_certificate,
        "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
    )
    .unwrap();

    assert!(
        read_or_create_credentials("app", Some(dir.path()), Algorithm::Ed25519, "", [""; 0])
            .is_err()
    );
}

#[test]
fn creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("nested").join("cache");

    let leaf = provision(&nested).unwrap();
    let layout = CacheLayout::new("app", Some(&nested)).unwrap();

    assert_eq!(read_certificate(&layout.leaf_certificate).unwrap(), leaf.certificate);
}
