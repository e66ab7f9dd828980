#![cfg(feature = "rustls")]

use std::sync::Arc;

use localtls::{Algorithm, create_credentials};
use rstest::rstest;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::{TlsAcceptor, TlsConnector, rustls::pki_types::ServerName};

#[rstest]
#[case(Algorithm::Ed25519, "localhost")]
#[case(Algorithm::Ed25519, "127.0.0.1")]
#[case(Algorithm::Rsa, "localhost")]
#[case(Algorithm::Ecdsa, "127.0.0.1")]
#[tokio::test]
async fn loopback_handshake(#[case] algorithm: Algorithm, #[case] server_name: &'static str) {
    let credentials = create_credentials(algorithm, "", [""; 0]).unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(credentials.server_config().unwrap()));
    let connector = TlsConnector::from(Arc::new(credentials.client_config().unwrap()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut stream = acceptor.accept(stream).await.unwrap();

        let mut buffer = [0u8; 5];
        stream.read_exact(&mut buffer).await.unwrap();
        stream.write_all(&buffer).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let stream = TcpStream::connect(address).await.unwrap();
    let mut stream = connector
        .connect(ServerName::try_from(server_name).unwrap(), stream)
        .await
        .unwrap();

    stream.write_all(b"HELLO").await.unwrap();
    let mut buffer = [0u8; 5];
    stream.read_exact(&mut buffer).await.unwrap();

    assert_eq!(&buffer, b"HELLO");
    server.await.unwrap();
}

#[tokio::test]
async fn unknown_server_name_is_rejected() {
    let credentials = create_credentials(Algorithm::Ecdsa, "", ["svc.example"]).unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(credentials.server_config().unwrap()));
    let connector = TlsConnector::from(Arc::new(credentials.client_config().unwrap()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        acceptor.accept(stream).await.is_err()
    });

    let stream = TcpStream::connect(address).await.unwrap();
    let result = connector
        .connect(ServerName::try_from("localhost").unwrap(), stream)
        .await;

    assert!(result.is_err());
    assert!(server.await.unwrap());
}
