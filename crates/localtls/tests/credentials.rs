use std::{collections::HashSet, net::IpAddr};

use jiff::{ToSpan, civil::Time, tz::TimeZone};
use localtls::{
    Algorithm, PemObject, PrivateKey,
    algorithm::UnsupportedAlgorithmError,
    certificate::common_name,
    create_credentials, credentials, host, keys, parse_pem, read_pem_from_file,
};
use rstest::rstest;

#[rstest]
#[case(Algorithm::Ed25519)]
#[case(Algorithm::Rsa)]
#[case(Algorithm::Ecdsa)]
fn private_key_pem_round_trip(#[case] algorithm: Algorithm) {
    let key = PrivateKey::new(algorithm).unwrap();
    let pem = key.to_pem().unwrap();

    let PemObject::PrivateKey(parsed) = parse_pem(&pem).unwrap() else {
        panic!("expected a private key");
    };
    assert_eq!(parsed.algorithm(), algorithm);
    assert_eq!(
        parsed.to_der().unwrap().as_bytes(),
        key.to_der().unwrap().as_bytes()
    );
}

#[rstest]
#[case(Algorithm::Ed25519)]
#[case(Algorithm::Rsa)]
#[case(Algorithm::Ecdsa)]
fn public_key_pem_round_trip(#[case] algorithm: Algorithm) {
    let public_key = PrivateKey::new(algorithm).unwrap().public_key();
    let pem = public_key.to_pem().unwrap();

    let PemObject::PublicKey(parsed) = parse_pem(&pem).unwrap() else {
        panic!("expected a public key");
    };
    assert_eq!(parsed, public_key);
}

#[rstest]
#[case(Algorithm::Ed25519)]
#[case(Algorithm::Rsa)]
#[case(Algorithm::Ecdsa)]
fn credentials_are_consistent(#[case] algorithm: Algorithm) {
    let credentials = create_credentials(algorithm, "", [""; 0]).unwrap();

    for certificate in [&credentials.leaf_certificate, &credentials.ca_certificate] {
        let PemObject::Certificate(parsed) = parse_pem(&certificate.to_pem()).unwrap() else {
            panic!("expected a certificate");
        };
        assert_eq!(parsed.der(), certificate.der());
    }

    // The CA is self-signed and the leaf is signed by the CA
    credentials
        .ca_certificate
        .check_signature_from(&credentials.ca_certificate)
        .unwrap();
    credentials
        .leaf_certificate
        .check_signature_from(&credentials.ca_certificate)
        .unwrap();

    // The leaf is not signed by itself
    assert!(
        credentials
            .leaf_certificate
            .check_signature_from(&credentials.leaf_certificate)
            .is_err()
    );

    assert_eq!(
        credentials.ca_certificate.public_key().unwrap(),
        credentials.ca_key.public_key()
    );
    assert_eq!(
        credentials.leaf_certificate.public_key().unwrap(),
        credentials.leaf_key.public_key()
    );
    assert_eq!(credentials.ca_key.algorithm(), algorithm);
    assert_eq!(credentials.leaf_key.algorithm(), algorithm);
}

#[test]
fn localhost_by_default() {
    let credentials = create_credentials(Algorithm::Ed25519, "", [""; 0]).unwrap();
    let (dns_names, ip_addresses) = credentials.leaf_certificate.subject_alt_names().unwrap();

    assert_eq!(dns_names, ["localhost"]);
    assert_eq!(
        ip_addresses,
        [
            "127.0.0.1".parse::<IpAddr>().unwrap(),
            "::1".parse().unwrap()
        ]
    );

    let ca = credentials.ca_certificate.parse().unwrap();
    let ca_name = common_name(&ca.tbs_certificate.subject).unwrap();
    let hostname = host::short_hostname().unwrap();
    let date = jiff::Zoned::now().strftime("%y%m%d").to_string();
    assert!(ca_name.starts_with(&hostname));
    assert!(ca_name.ends_with(&format!("ca-{date}")));
}

#[test]
fn rsa_with_canonical_name_and_addresses() {
    let credentials =
        create_credentials(Algorithm::Rsa, "myca", ["10.0.0.1", "svc.example"]).unwrap();
    let (dns_names, ip_addresses) = credentials.leaf_certificate.subject_alt_names().unwrap();

    assert_eq!(dns_names, ["svc.example"]);
    assert_eq!(ip_addresses, ["10.0.0.1".parse::<IpAddr>().unwrap()]);

    let leaf = credentials.leaf_certificate.parse().unwrap();
    assert_eq!(
        common_name(&leaf.tbs_certificate.issuer).as_deref(),
        Some("myca")
    );
    assert_eq!(credentials.leaf_key.public_key().key_size(), 2048);
}

#[test]
fn addresses_keep_their_order() {
    let entries = ["b.example", "fe80::1", "a.example", "192.168.0.2", "10.0.0.1"];
    let credentials = create_credentials(Algorithm::Ecdsa, "", entries).unwrap();
    let (dns_names, ip_addresses) = credentials.leaf_certificate.subject_alt_names().unwrap();

    assert_eq!(dns_names, ["b.example", "a.example"]);
    assert_eq!(
        ip_addresses,
        ["fe80::1", "192.168.0.2", "10.0.0.1"].map(|ip| ip.parse::<IpAddr>().unwrap())
    );
}

#[test]
fn empty_address_is_rejected() {
    let err =
        create_credentials(Algorithm::Ecdsa, "", ["10.0.0.1", "svc.example", ""]).unwrap_err();

    assert!(matches!(err, credentials::Error::EmptyAddress { position: 3 }));
    assert!(err.to_string().contains('3'));
}

#[rstest]
#[case("dsa")]
#[case("x25519")]
#[case("")]
fn unsupported_algorithm_name(#[case] name: &str) {
    assert!(matches!(
        name.parse::<Algorithm>(),
        Err(UnsupportedAlgorithmError::UnsupportedName { .. })
    ));
}

#[test]
fn unsupported_key_algorithm() {
    // PKCS#8 document carrying an X25519 key (OID 1.3.101.110)
    let mut der = vec![
        0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x04, 0x22, 0x04,
        0x20,
    ];
    der.extend_from_slice(&[0x42; 32]);

    assert!(matches!(
        PrivateKey::from_der(&der),
        Err(keys::Error::UnsupportedAlgorithm {
            source: UnsupportedAlgorithmError::UnsupportedOid { .. }
        })
    ));
}

#[test]
fn ed25519_key_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("key.pem");
    let key = PrivateKey::new(Algorithm::Ed25519).unwrap();

    std::fs::write(&path, key.to_pem().unwrap().as_bytes()).unwrap();

    let Some(PemObject::PrivateKey(parsed)) = read_pem_from_file(&path).unwrap() else {
        panic!("expected a private key");
    };
    assert_eq!(parsed.algorithm(), Algorithm::Ed25519);
    assert_eq!(parsed.public_key(), key.public_key());
}

#[test]
fn serial_numbers_are_unique() {
    let mut serials = HashSet::new();

    for _ in 0..1000 {
        let credentials = create_credentials(Algorithm::Ed25519, "", [""; 0]).unwrap();

        for certificate in [credentials.leaf_certificate, credentials.ca_certificate] {
            let serial = certificate.parse().unwrap().tbs_certificate.serial_number;
            assert!(serials.insert(serial.as_bytes().to_vec()));
        }
    }
}

#[rstest]
#[case(Algorithm::Ed25519)]
#[case(Algorithm::Ecdsa)]
fn validity_window(#[case] algorithm: Algorithm) {
    let credentials = create_credentials(algorithm, "", [""; 0]).unwrap();

    for certificate in [&credentials.ca_certificate, &credentials.leaf_certificate] {
        let (not_before, not_after) = certificate.validity().unwrap();
        let not_before = not_before.to_zoned(TimeZone::UTC);

        assert_eq!(not_before.time(), Time::midnight());
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
}
