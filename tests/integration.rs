use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rax_ftp_client::utils::setup_test_logging;
use rax_ftp_client::{
    ClientConfig, ClientError, ClientSession, ConnectionMode, ProtocolError, TransferType,
};

// What the scripted server does after receiving each command
enum Step {
    Reply(String),
    Hangup,
}

fn reply(line: &str) -> Step {
    Step::Reply(line.to_string())
}

struct ScriptedServer {
    port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl ScriptedServer {
    fn start(steps: Vec<Step>) -> Self {
        Self::start_with_greeting(None, steps)
    }

    // Accepts one control connection, answers each received command with
    // the next step and records every command line it saw.
    fn start_with_greeting(greeting: Option<&'static str>, steps: Vec<Step>) -> Self {
        setup_test_logging();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut received = Vec::new();
            let mut steps = steps.into_iter();

            if let Some(greeting) = greeting {
                writer.write_all(greeting.as_bytes()).unwrap();
            }

            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => received.push(line.trim_end().to_string()),
                }
                match steps.next() {
                    Some(Step::Reply(text)) => {
                        if writer.write_all(format!("{}\r\n", text).as_bytes()).is_err() {
                            break;
                        }
                    }
                    Some(Step::Hangup) => break,
                    None => {}
                }
            }
            received
        });

        Self { port, handle }
    }

    fn connect(&self) -> ClientSession {
        let config = ClientConfig {
            read_timeout_secs: 5,
            active_bind_address: "127.0.0.1".into(),
            ..ClientConfig::default()
        };
        ClientSession::connect_with_config("127.0.0.1", self.port, config).unwrap()
    }

    fn received(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

fn port_octets(command: &str) -> (u16, u16) {
    let fields: Vec<u16> = command
        .trim_start_matches("PORT ")
        .split(',')
        .map(|f| f.parse().unwrap())
        .collect();
    assert_eq!(fields.len(), 6, "bad PORT command: {}", command);
    (fields[4], fields[5])
}

#[test]
fn test_login_without_password() {
    let server = ScriptedServer::start(vec![reply("230 User logged in")]);
    let session = server.connect();

    assert!(session.login("anonymous", "ignored"));
    assert_eq!(session.username().as_deref(), Some("anonymous"));

    drop(session);
    assert_eq!(server.received(), vec!["USER anonymous"]);
}

#[test]
fn test_login_with_password() {
    let server = ScriptedServer::start(vec![
        reply("331 Password required"),
        reply("230 Login successful"),
    ]);
    let session = server.connect();

    assert!(session.login("alice", "alice123"));

    drop(session);
    assert_eq!(server.received(), vec!["USER alice", "PASS alice123"]);
}

#[test]
fn test_login_wrong_password() {
    let server = ScriptedServer::start(vec![
        reply("331 Password required"),
        reply("530 Login incorrect"),
    ]);
    let session = server.connect();

    assert!(!session.login("alice", "wrong"));

    drop(session);
    assert_eq!(server.received(), vec!["USER alice", "PASS wrong"]);
}

#[test]
fn test_login_unknown_user_never_sends_pass() {
    let server = ScriptedServer::start(vec![reply("530 Not logged in")]);
    let session = server.connect();

    assert!(!session.login("mallory", "secret"));

    drop(session);
    assert_eq!(server.received(), vec!["USER mallory"]);
}

#[test]
fn test_login_connection_drop_returns_false() {
    let server = ScriptedServer::start(vec![reply("331 Password required"), Step::Hangup]);
    let session = server.connect();

    assert!(!session.login("bob", "bob123"));

    drop(session);
    assert_eq!(server.received(), vec!["USER bob", "PASS bob123"]);
}

#[test]
fn test_login_drop_after_user_returns_false() {
    let server = ScriptedServer::start(vec![Step::Hangup]);
    let session = server.connect();

    assert!(!session.login("carol", "carol123"));

    drop(session);
    assert_eq!(server.received(), vec!["USER carol"]);
}

#[test]
fn test_stale_greeting_is_drained() {
    let server = ScriptedServer::start_with_greeting(
        Some("220 Welcome to RAX FTP Server\r\n"),
        vec![reply("230 User logged in")],
    );
    let session = server.connect();
    thread::sleep(Duration::from_millis(200));

    assert!(session.login("anonymous", ""));
}

#[test]
fn test_pasv_sets_endpoint() {
    let server = ScriptedServer::start(vec![reply(
        "227 Entering Passive Mode (192,168,1,10,4,1)",
    )]);
    let session = server.connect();

    let endpoint = session.pasv().unwrap();
    assert_eq!(endpoint.host(), "192.168.1.10");
    assert_eq!(endpoint.port(), 1025);
    assert_eq!(endpoint.mode, ConnectionMode::Passive);
    assert_eq!(session.data_endpoint(), Some(endpoint));
    assert_eq!(session.mode(), ConnectionMode::Passive);

    drop(session);
    assert_eq!(server.received(), vec!["PASV"]);
}

#[test]
fn test_pasv_failure_keeps_previous_endpoint() {
    let server = ScriptedServer::start(vec![
        reply("227 Entering Passive Mode (10,0,0,1,19,137)"),
        reply("227 Entering Passive Mode (10,0,0,1,19)"),
        reply("425 Can't open data connection"),
    ]);
    let session = server.connect();

    let first = session.pasv().unwrap();

    match session.pasv() {
        Err(ClientError::Protocol(ProtocolError::MalformedPassiveAddress(_))) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(session.pasv().unwrap_err().is_rejected());

    assert_eq!(session.data_endpoint(), Some(first));
    assert_eq!(first.port(), 19 * 256 + 137);
}

#[test]
fn test_port_advertises_listener() {
    let server = ScriptedServer::start(vec![reply("200 PORT command successful")]);
    let session = server.connect();

    let endpoint = session.port().unwrap();
    assert_eq!(endpoint.mode, ConnectionMode::Active);
    assert_eq!(session.mode(), ConnectionMode::Active);
    assert_eq!(
        session.listener_addr().map(|a| a.port()),
        Some(endpoint.port())
    );

    drop(session);
    let received = server.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].starts_with("PORT 127,0,0,1,"));

    let (p1, p2) = port_octets(&received[0]);
    assert!((1..=255).contains(&p1) && (1..=255).contains(&p2));
    assert!((p1, p2) != (1, 1));
    assert_eq!(p1 * 256 + p2, endpoint.port());
}

#[test]
fn test_rejected_port_leaves_listener_until_released() {
    let server = ScriptedServer::start(vec![reply("500 PORT not allowed")]);
    let session = server.connect();

    let err = session.port().unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(session.mode(), ConnectionMode::Passive);
    assert_eq!(session.data_endpoint(), None);

    let addr = session.listener_addr().expect("listener should be held");
    session.release_listener();
    assert_eq!(session.listener_addr(), None);

    // The port is free again once released.
    assert!(TcpListener::bind(addr).is_ok());
}

#[test]
fn test_set_type_commits_only_on_success() {
    let server = ScriptedServer::start(vec![
        reply("200 Type set to A"),
        reply("504 Command not implemented for that parameter"),
    ]);
    let session = server.connect();
    assert_eq!(session.transfer_type(), TransferType::Binary);

    session.set_type(TransferType::Ascii).unwrap();
    assert_eq!(session.transfer_type(), TransferType::Ascii);

    assert!(session.set_type(TransferType::Binary).is_err());
    assert_eq!(session.transfer_type(), TransferType::Ascii);

    drop(session);
    assert_eq!(server.received(), vec!["TYPE A", "TYPE B"]);
}

#[test]
fn test_noop_never_changes_state() {
    let server = ScriptedServer::start(vec![reply("200 NOOP ok"), reply("421 Service closing")]);
    let session = server.connect();

    session.noop().unwrap();
    assert!(session.noop().unwrap_err().is_rejected());

    assert_eq!(session.mode(), ConnectionMode::Passive);
    assert_eq!(session.transfer_type(), TransferType::Binary);
    assert_eq!(session.data_endpoint(), None);

    drop(session);
    assert_eq!(server.received(), vec!["NOOP", "NOOP"]);
}

#[test]
fn test_quit_closes_connection() {
    let server = ScriptedServer::start(vec![reply("221 Goodbye")]);
    let session = server.connect();

    session.quit().unwrap();
    assert!(!session.is_connected());
    assert_eq!(session.username(), None);

    // The server sees end of stream without the session being dropped.
    assert_eq!(server.received(), vec!["QUIT"]);

    match session.noop() {
        Err(ClientError::Io(e)) => assert_eq!(e.kind(), ErrorKind::NotConnected),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_refused_quit_keeps_connection_open() {
    let server = ScriptedServer::start(vec![reply("500 No"), reply("200 still here")]);
    let session = server.connect();

    assert!(session.quit().unwrap_err().is_rejected());
    assert!(session.is_connected());
    session.noop().unwrap();

    drop(session);
    assert_eq!(server.received(), vec!["QUIT", "NOOP"]);
}

// Starts a data listener and a control script whose first reply is the
// matching 227, followed by `rest`.
fn passive_setup(rest: Vec<Step>) -> (TcpListener, ScriptedServer) {
    let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let data_port = data_listener.local_addr().unwrap().port();
    let mut steps = vec![Step::Reply(format!(
        "227 Entering Passive Mode (127,0,0,1,{},{})",
        data_port / 256,
        data_port % 256
    ))];
    steps.extend(rest);
    (data_listener, ScriptedServer::start(steps))
}

#[test]
fn test_passive_data_stream_connects_out() {
    let (data_listener, server) = passive_setup(Vec::new());
    let session = server.connect();

    session.pasv().unwrap();
    let mut stream = session.open_data_stream().unwrap();
    let (accepted, _) = data_listener.accept().unwrap();

    stream.write_all(b"payload").unwrap();
    let mut received = [0u8; 7];
    (&accepted).read_exact(&mut received).unwrap();
    assert_eq!(&received, b"payload");
}

#[test]
fn test_quit_closes_data_stream() {
    let (data_listener, server) = passive_setup(vec![reply("221 Goodbye")]);
    let session = server.connect();

    session.pasv().unwrap();
    let mut stream = session.open_data_stream().unwrap();
    let (mut accepted, _) = data_listener.accept().unwrap();
    accepted
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    session.quit().unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(accepted.read(&mut buf).unwrap(), 0);
    assert_eq!(stream.read(&mut buf).unwrap(), 0);
    assert_eq!(server.received(), vec!["PASV", "QUIT"]);
}

#[test]
fn test_refused_quit_keeps_data_stream_open() {
    let (data_listener, server) = passive_setup(vec![reply("500 No")]);
    let session = server.connect();

    session.pasv().unwrap();
    let mut stream = session.open_data_stream().unwrap();
    let (mut accepted, _) = data_listener.accept().unwrap();
    accepted
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    assert!(session.quit().unwrap_err().is_rejected());

    stream.write_all(b"still").unwrap();
    let mut received = [0u8; 5];
    accepted.read_exact(&mut received).unwrap();
    assert_eq!(&received, b"still");

    accepted.write_all(b"back").unwrap();
    let mut echoed = [0u8; 4];
    stream.read_exact(&mut echoed).unwrap();
    assert_eq!(&echoed, b"back");

    drop(session);
    assert_eq!(server.received(), vec!["PASV", "QUIT"]);
}

#[test]
fn test_active_data_stream_accepts_server() {
    let server = ScriptedServer::start(vec![reply("200 PORT command successful")]);
    let session = server.connect();

    let endpoint = session.port().unwrap();
    let connector = thread::spawn(move || TcpStream::connect(endpoint.addr).unwrap());

    let stream = session.open_data_stream().unwrap();
    let peer = connector.join().unwrap();
    assert_eq!(stream.peer_addr().unwrap(), peer.local_addr().unwrap());
}

#[test]
fn test_operations_are_serialized() {
    let server = ScriptedServer::start(vec![reply("200 one"), reply("200 two")]);
    let session = Arc::new(server.connect());

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let session = Arc::clone(&session);
            thread::spawn(move || session.noop())
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }

    drop(session);
    assert_eq!(server.received(), vec!["NOOP", "NOOP"]);
}

#[test]
fn test_connect_failure_is_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    match ClientSession::connect("127.0.0.1", port) {
        Err(ClientError::Connection(_)) => {}
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("connect should fail"),
    }
}
