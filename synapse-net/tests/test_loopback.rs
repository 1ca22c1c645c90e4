//! ループバックのTCP接続でハーネス全体を動かすテスト

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use synapse_core::{DebugError, DebuggerConfig};
use synapse_net::{DuplexClient, Harness, HarnessConfig, NetConfig};
use synapse_proto::rsp::checksum;
use synapse_proto::{encode_frame, FrameDecoder, Handshake, MemView, Message};
use synapse_target::{Machine, RamMachine};

const TIMEOUT: Duration = Duration::from_secs(5);

fn net_config() -> NetConfig {
    NetConfig {
        poll_interval: Duration::from_millis(10),
        reconnect_interval: Duration::from_millis(20),
        write_timeout: Duration::from_millis(200),
    }
}

fn start_harness(gdb: bool) -> Harness<RamMachine> {
    let mut machine = RamMachine::new(0x4000);
    machine.write_memory(0x1000, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    let config = HarnessConfig {
        private_addr: "127.0.0.1:0".to_string(),
        gdb_addr: gdb.then(|| "127.0.0.1:0".to_string()),
        debugger: DebuggerConfig {
            frame_cycles: 0x100,
            symbols_addr: 0x800,
            poll_interval: Duration::from_millis(10),
            ..DebuggerConfig::default()
        },
        net: net_config(),
        tapes: vec!["boot".to_string(), "game".to_string()],
    };
    Harness::start(machine, config).unwrap()
}

/// 条件に合うメッセージが届くまで待つ（途中のメッセージは捨てる）
fn wait_for(rx: &Receiver<Message>, mut pred: impl FnMut(&Message) -> bool) -> Message {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let message = rx.recv_timeout(left).expect("timed out waiting for message");
        if pred(&message) {
            return message;
        }
    }
}

fn connected_client(harness: &Harness<RamMachine>) -> (DuplexClient, Receiver<Message>) {
    let server = harness.private_addr().to_string();
    DuplexClient::start(&server, "127.0.0.1", net_config()).unwrap()
}

#[test]
fn test_client_receives_state_after_connect() {
    let harness = start_harness(false);
    let (client, rx) = connected_client(&harness);

    let message = wait_for(&rx, |m| matches!(m, Message::State(_)));
    assert!(matches!(message, Message::State(_)));
    assert!(client.is_connected());
}

#[test]
fn test_breakpoint_hit_sends_stop_then_state() {
    let harness = start_harness(false);
    let (client, rx) = connected_client(&harness);
    wait_for(&rx, |m| matches!(m, Message::State(_)));

    client.send(&Message::SetBreakpoint(0x400)).unwrap();
    wait_for(&rx, |m| *m == Message::Stop);
    let Message::State(state) = wait_for(&rx, |m| matches!(m, Message::State(_))) else {
        unreachable!();
    };
    assert_eq!(state.pc, 0x400);

    client.send(&Message::TapeRequest(synapse_proto::TapeRequest { id: 3, start: 1, size: 4 })).unwrap();
    let Message::TapeList(list) = wait_for(&rx, |m| matches!(m, Message::TapeList(_))) else {
        unreachable!();
    };
    assert_eq!(list.id, 3);
    assert_eq!(list.total, 2);
    assert_eq!(list.names, vec!["game".to_string()]);
}

#[test]
fn test_unknown_message_type_is_skipped() {
    let harness = start_harness(false);
    let replies = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = replies.local_addr().unwrap().port();

    let mut stream = TcpStream::connect(harness.private_addr()).unwrap();
    let mut bytes = Vec::new();
    // 長さ8、タグ99、中身4バイト
    bytes.extend_from_slice(&8u32.to_be_bytes());
    bytes.extend_from_slice(&99u32.to_be_bytes());
    bytes.extend_from_slice(&[1, 2, 3, 4]);
    bytes.extend_from_slice(&encode_frame(&Message::Connect(Handshake {
        host: "127.0.0.1".to_string(),
        port,
    })));
    stream.write_all(&bytes).unwrap();

    let (mut uplink, _) = replies.accept().unwrap();
    uplink.set_read_timeout(Some(TIMEOUT)).unwrap();
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 1024];
    let first = loop {
        let n = uplink.read(&mut buf).unwrap();
        assert!(n > 0, "uplink closed");
        if let Some(payload) = decoder.push(&buf[..n]).unwrap().into_iter().next() {
            break Message::decode(&payload).unwrap();
        }
    };
    assert!(matches!(first, Message::State(_)));
}

#[test]
fn test_harness_shutdown_joins() {
    let mut harness = start_harness(true);
    let token = harness.shutdown_token();
    harness.shutdown();
    assert!(token.is_triggered());
    // リスナーは閉じている
    assert!(TcpStream::connect(harness.private_addr()).is_err());
}

#[test]
fn test_stalled_peer_does_not_block_shutdown() {
    let config = HarnessConfig {
        private_addr: "127.0.0.1:0".to_string(),
        gdb_addr: None,
        debugger: DebuggerConfig {
            frame_cycles: 0x100,
            poll_interval: Duration::from_millis(10),
            ..DebuggerConfig::default()
        },
        net: net_config(),
        tapes: Vec::new(),
    };
    let mut harness = Harness::start(RamMachine::new(0x200000), config).unwrap();

    // 受け付けるだけで一切読まないピア
    let replies = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = replies.local_addr().unwrap().port();
    let mut stream = TcpStream::connect(harness.private_addr()).unwrap();
    stream
        .write_all(&encode_frame(&Message::Connect(Handshake {
            host: "127.0.0.1".to_string(),
            port,
        })))
        .unwrap();
    let (_stalled, _) = replies.accept().unwrap();

    // 更新のたびに1MiBずつ送られ、ソケットバッファがすぐに埋まる
    let mut bytes = encode_frame(&Message::MemWatch(MemView {
        id: 1,
        start: 0,
        size: 0,
        watch_start: 0,
        watch_size: 0x100000,
    }));
    for _ in 0..40 {
        bytes.extend_from_slice(&encode_frame(&Message::Step));
    }
    stream.write_all(&bytes).unwrap();
    std::thread::sleep(Duration::from_millis(300));

    let (done_tx, done_rx) = mpsc::channel();
    std::thread::spawn(move || {
        harness.shutdown();
        let _ = done_tx.send(());
    });
    assert!(done_rx.recv_timeout(TIMEOUT).is_ok(), "shutdown hung on a stalled peer");
}

#[test]
fn test_zero_frame_cycles_is_rejected() {
    let config = HarnessConfig {
        private_addr: "127.0.0.1:0".to_string(),
        gdb_addr: None,
        debugger: DebuggerConfig {
            frame_cycles: 0,
            ..DebuggerConfig::default()
        },
        net: net_config(),
        tapes: Vec::new(),
    };
    let err = Harness::start(RamMachine::new(0x1000), config).err().unwrap();
    assert!(matches!(err.downcast_ref::<DebugError>(), Some(DebugError::InvalidConfig(_))));
}

fn packet(payload: &str) -> Vec<u8> {
    format!("${}#{:02x}", payload, checksum(payload.as_bytes())).into_bytes()
}

/// 期待するバイト列が揃うまで読む
fn expect_bytes(stream: &mut TcpStream, expected: &[u8]) {
    let deadline = Instant::now() + TIMEOUT;
    let mut got = Vec::new();
    let mut buf = [0u8; 512];
    while got.len() < expected.len() {
        assert!(Instant::now() < deadline, "timed out, got {:?}", String::from_utf8_lossy(&got));
        match stream.read(&mut buf) {
            Ok(0) => panic!("connection closed, got {:?}", String::from_utf8_lossy(&got)),
            Ok(n) => got.extend_from_slice(&buf[..n]),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
            Err(e) => panic!("read failed: {}", e),
        }
    }
    assert_eq!(String::from_utf8_lossy(&got), String::from_utf8_lossy(expected));
}

fn gdb_stream(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
    stream
}

#[test]
fn test_gdb_memory_breakpoint_and_continue() {
    let harness = start_harness(true);
    let mut gdb = gdb_stream(harness.gdb_addr().unwrap());

    gdb.write_all(&packet("m1000,4")).unwrap();
    let mut expected = b"+".to_vec();
    expected.extend(packet("deadbeef"));
    expect_bytes(&mut gdb, &expected);

    gdb.write_all(&packet("Z1,2000,4")).unwrap();
    let mut expected = b"+".to_vec();
    expected.extend(packet("OK"));
    expect_bytes(&mut gdb, &expected);

    gdb.write_all(&packet("c")).unwrap();
    expect_bytes(&mut gdb, b"+$T05swbreak:;#1d");

    gdb.write_all(&packet("p0f")).unwrap();
    let mut expected = b"+".to_vec();
    expected.extend(packet("00200000"));
    expect_bytes(&mut gdb, &expected);
}

#[test]
fn test_gdb_interrupt_and_bad_checksum() {
    let harness = start_harness(true);
    let mut gdb = gdb_stream(harness.gdb_addr().unwrap());

    gdb.write_all(b"$m1000,4#00").unwrap();
    expect_bytes(&mut gdb, b"-");

    gdb.write_all(&packet("c")).unwrap();
    expect_bytes(&mut gdb, b"+");
    std::thread::sleep(Duration::from_millis(50));
    gdb.write_all(&[0x03]).unwrap();
    expect_bytes(&mut gdb, &packet("T02"));
}
