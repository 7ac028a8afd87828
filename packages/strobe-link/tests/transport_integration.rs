use std::time::Duration;
use strobe_link::{ConnectionState, LineTransport, TransportError, TransportEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn next(rx: &mut UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_send_appends_single_newline() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let expected = b"STATUS\nLAMP OFF\n~device set lamp:046|SUBC24991\n";
        let mut received = vec![0u8; expected.len()];
        socket.read_exact(&mut received).await.unwrap();
        received
    });

    let mut transport = LineTransport::new();
    let _events = transport.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(transport.state(), ConnectionState::Connected);

    transport.send("STATUS").await.unwrap();
    transport.send("LAMP OFF\n").await.unwrap();
    transport.send("~device set lamp:046|SUBC24991").await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"STATUS\nLAMP OFF\n~device set lamp:046|SUBC24991\n".to_vec());
}

#[tokio::test]
async fn test_lines_reassembled_in_wire_order() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"ST").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        socket.write_all(b"ATUS\n").await.unwrap();
        socket.write_all(b"EXPOSURE_COUNT 3\r\nRS485: 01 02\n").await.unwrap();
        socket.flush().await.unwrap();
        // Dropping the socket closes the connection.
    });

    let mut transport = LineTransport::new();
    let mut events = transport.connect("127.0.0.1", port).await.unwrap();

    assert_eq!(next(&mut events).await, TransportEvent::Line("STATUS".to_string()));
    assert_eq!(
        next(&mut events).await,
        TransportEvent::Line("EXPOSURE_COUNT 3".to_string())
    );
    assert_eq!(
        next(&mut events).await,
        TransportEvent::Line("RS485: 01 02".to_string())
    );
    assert_eq!(
        next(&mut events).await,
        TransportEvent::Disconnected { reason: None }
    );

    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(matches!(
        transport.send("STATUS").await,
        Err(TransportError::NotConnected)
    ));
}

#[tokio::test]
async fn test_connect_refused_is_connection_error() {
    let (listener, port) = listener().await;
    drop(listener);

    let mut transport = LineTransport::new();
    let err = transport.connect("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, TransportError::Connection { .. }));
    assert_eq!(transport.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_close_is_idempotent_and_reported() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        // Returns once the client side is shut down.
        let _ = socket.read_to_end(&mut buf).await;
    });

    let mut transport = LineTransport::new();
    let mut events = transport.connect("127.0.0.1", port).await.unwrap();

    transport.close();
    transport.close();
    assert_eq!(transport.state(), ConnectionState::Disconnected);
    assert!(transport.peer().is_none());

    assert!(matches!(
        next(&mut events).await,
        TransportEvent::Disconnected { .. }
    ));
    assert!(matches!(
        transport.send("STATUS").await,
        Err(TransportError::NotConnected)
    ));

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_reconnect_replaces_connection() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        for greeting in [&b"FIRST\n"[..], &b"SECOND\n"[..]] {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(greeting).await.unwrap();
            let mut buf = Vec::new();
            let _ = socket.read_to_end(&mut buf).await;
        }
    });

    let mut transport = LineTransport::new();
    let mut first = transport.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(next(&mut first).await, TransportEvent::Line("FIRST".to_string()));

    let mut second = transport.connect("127.0.0.1", port).await.unwrap();
    assert!(matches!(next(&mut first).await, TransportEvent::Disconnected { .. }));
    assert_eq!(next(&mut second).await, TransportEvent::Line("SECOND".to_string()));
    assert_eq!(transport.peer(), Some(format!("127.0.0.1:{}", port).as_str()));

    transport.close();
}
