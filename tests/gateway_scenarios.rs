//! End-to-end scenarios driving a [`Connection`] purely through byte
//! buffers, simulating a conforming Discord gateway peer.

use shardcore::{
    close::CloseClassification,
    config::ConnectionConfig,
    connection::Connection,
    payloads::Intents,
    ws::handshake::accept_key,
};

/// Build an unmasked server-to-client WebSocket frame (servers never mask).
fn server_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x80 | opcode];

    let len = payload.len();
    if len < 126 {
        frame.push(len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

fn server_text_frame(json: &str) -> Vec<u8> {
    server_frame(0x1, json.as_bytes())
}

fn server_close_frame(code: u16, reason: &str) -> Vec<u8> {
    let mut payload = code.to_be_bytes().to_vec();
    payload.extend_from_slice(reason.as_bytes());
    server_frame(0x8, &payload)
}

/// Extract the `Sec-WebSocket-Key` a [`Connection::connect`] request used,
/// so a test server double can compute a matching accept value.
fn client_key_from_request(request: &[u8]) -> String {
    let text = String::from_utf8_lossy(request);
    text.lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .expect("request carries a Sec-WebSocket-Key header")
        .trim()
        .to_owned()
}

fn accepted_handshake_response(request: &[u8]) -> Vec<u8> {
    let key = client_key_from_request(request);
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(&key)
    )
    .into_bytes()
}

fn no_compression_config() -> ConnectionConfig {
    ConnectionConfig::builder("token".to_owned(), Intents::empty())
        .build()
}

fn connect_and_handshake(connection: &mut Connection) {
    let request = connection.connect();
    let response = accepted_handshake_response(&request);
    let outbound = connection.receive(&response).unwrap();
    assert!(outbound.is_empty());
}

/// Happy path: connect, HELLO, IDENTIFY, READY dispatch is surfaced as an
/// event with the session identity captured.
#[test]
fn happy_path_identify_and_ready() {
    let mut connection = Connection::new(no_compression_config());
    connect_and_handshake(&mut connection);

    let hello = server_text_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
    let outbound = connection.receive(&hello).unwrap();
    assert!(outbound.is_empty());

    let identify_bytes = connection.identify().unwrap();
    assert!(!identify_bytes.is_empty());

    let ready = server_text_frame(
        r#"{"op":0,"s":1,"t":"READY","d":{"session_id":"abc123","resume_gateway_url":"wss://resume.example"}}"#,
    );
    let outbound = connection.receive(&ready).unwrap();
    assert!(outbound.is_empty());

    let events: Vec<_> = connection.events().collect();
    assert_eq!(1, events.len());
    assert_eq!("READY", &*events[0].name);
    assert_eq!(1, events[0].sequence);

    let view = connection.session_view();
    assert_eq!(Some(41), view.heartbeat_interval);
}

/// Heartbeat ack cycle: a locally-initiated heartbeat followed by a
/// HEARTBEAT_ACK keeps the connection healthy.
#[test]
fn heartbeat_ack_cycle() {
    let mut connection = Connection::new(no_compression_config());
    connect_and_handshake(&mut connection);

    let hello = server_text_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
    connection.receive(&hello).unwrap();

    let heartbeat_bytes = connection.heartbeat();
    assert!(!heartbeat_bytes.is_empty());

    let ack = server_text_frame(r#"{"op":11,"d":null}"#);
    let outbound = connection.receive(&ack).unwrap();
    assert!(outbound.is_empty());

    // A second heartbeat is accepted since the prior one was acknowledged.
    let second = connection.heartbeat();
    assert!(!second.is_empty());
}

/// A zombied connection (no ack before the next heartbeat) closes itself
/// with code 4000 instead of sending another heartbeat.
#[test]
fn zombied_connection_self_closes() {
    let mut connection = Connection::new(no_compression_config());
    connect_and_handshake(&mut connection);

    let hello = server_text_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
    connection.receive(&hello).unwrap();

    let _first = connection.heartbeat();
    let second = connection.heartbeat();

    assert!(!second.is_empty());
    assert!(connection.session_view().closing);
}

/// A RECONNECT opcode is treated as a resumable disconnect: after the close
/// handshake completes, `reconnect()` preserves the session identity.
#[test]
fn resumable_disconnect_preserves_session() {
    let mut connection = Connection::new(no_compression_config());
    connect_and_handshake(&mut connection);

    let hello = server_text_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
    connection.receive(&hello).unwrap();

    let ready = server_text_frame(
        r#"{"op":0,"s":5,"t":"READY","d":{"session_id":"sess-1","resume_gateway_url":"wss://resume.example"}}"#,
    );
    connection.receive(&ready).unwrap();

    let reconnect_request = server_text_frame(r#"{"op":7,"d":null}"#);
    let outbound = connection.receive(&reconnect_request).unwrap();
    assert!(!outbound.is_empty()); // the echoed close frame

    let close_ack = server_close_frame(4000, "reconnect requested");
    let result = connection.receive(&close_ack);
    assert!(result.is_err());

    assert!(connection.should_reconnect());
    let backoff = connection.reconnect().unwrap();
    assert!(backoff >= 1.0);

    // The prior close was resumable, so the next identification must be a
    // RESUME rather than a fresh IDENTIFY.
    let hello = server_text_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
    connection.receive(&hello).unwrap();
    assert!(connection.identify().is_err());
    assert!(!connection.resume().unwrap().is_empty());
}

/// INVALID_SESSION with `d: false` clears the session and forces a fresh
/// IDENTIFY on the next connection attempt.
#[test]
fn invalid_session_non_resumable_clears_identity() {
    let mut connection = Connection::new(no_compression_config());
    connect_and_handshake(&mut connection);

    let hello = server_text_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
    connection.receive(&hello).unwrap();

    let ready = server_text_frame(
        r#"{"op":0,"s":2,"t":"READY","d":{"session_id":"sess-2","resume_gateway_url":"wss://resume.example"}}"#,
    );
    connection.receive(&ready).unwrap();

    let invalid_session = server_text_frame(r#"{"op":9,"d":false}"#);
    let outbound = connection.receive(&invalid_session).unwrap();
    assert!(!outbound.is_empty());

    let close_ack = server_close_frame(1000, "invalid session");
    let _ = connection.receive(&close_ack);

    connection.reconnect().unwrap();
    assert!(connection.session_view().heartbeat_interval.is_none());

    // The prior close was non-resumable, so the next identification must be
    // a fresh IDENTIFY rather than a RESUME.
    let hello = server_text_frame(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#);
    connection.receive(&hello).unwrap();
    assert!(connection.resume().is_err());
    assert!(!connection.identify().unwrap().is_empty());
}

/// A fatal close code (disallowed intents) forbids `reconnect()` entirely.
#[test]
fn fatal_close_forbids_reconnect() {
    let mut connection = Connection::new(no_compression_config());
    connect_and_handshake(&mut connection);

    let close = server_close_frame(4014, "disallowed intent(s)");
    let result = connection.receive(&close);

    match result {
        Err(err) => assert!(!err.should_reconnect()),
        Ok(_) => panic!("expected a close error"),
    }

    assert!(!connection.should_reconnect());
    assert!(connection.reconnect().is_err());
}

/// Rejected upgrades surface the HTTP status and body instead of a
/// websocket-level error.
#[test]
fn rejected_upgrade_surfaces_status_and_body() {
    let mut connection = Connection::new(no_compression_config());
    let _request = connection.connect();

    let response = b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 9\r\n\r\nbad token";
    let result = connection.receive(response);

    match result.unwrap_err().kind() {
        shardcore::error::ReceiveErrorType::ConnectionRejected { status, body } => {
            assert_eq!(401, *status);
            assert_eq!(b"bad token", body.as_slice());
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn close_classification_table_matches_spec() {
    assert_eq!(CloseClassification::Graceful, CloseClassification::from_code(1000));
    assert_eq!(CloseClassification::Fatal, CloseClassification::from_code(4004));
    assert_eq!(
        CloseClassification::ResumableDisconnect,
        CloseClassification::from_code(4009)
    );
}
