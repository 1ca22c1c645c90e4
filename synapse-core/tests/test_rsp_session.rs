//! RSPのバイト列からデバッガまでを通しで確認するテスト

use std::sync::{mpsc, Arc};
use std::time::Duration;
use synapse_core::{Debugger, DebuggerConfig, Detached, GdbOutcome};
use synapse_proto::rsp::{checksum, encode_packet};
use synapse_proto::{GdbCommand, PacketScanner, RspEvent};
use synapse_target::{Machine, RamMachine, Scheduler, ShutdownToken};

fn packet(payload: &str) -> Vec<u8> {
    format!("${}#{:02x}", payload, checksum(payload.as_bytes())).into_bytes()
}

fn setup() -> Debugger<RamMachine> {
    let mut machine = RamMachine::new(0x4000);
    machine.write_memory(0x1000, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    let scheduler = Arc::new(
        Scheduler::with_poll_interval(machine, ShutdownToken::new(), Duration::from_millis(10)).unwrap(),
    );
    let config = DebuggerConfig {
        frame_cycles: 0x100,
        poll_interval: Duration::from_millis(50),
        ..DebuggerConfig::default()
    };
    let mut debugger = Debugger::new(scheduler, config, Arc::new(Detached));
    debugger.gdb_attach();
    debugger
}

/// スキャナにバイト列を流し、届いたパケットを実行して返信パケットを集める
fn exchange(debugger: &mut Debugger<RamMachine>, scanner: &mut PacketScanner, bytes: &[u8]) -> Vec<Vec<u8>> {
    scanner.push(bytes);
    let mut out = Vec::new();
    while let Some(event) = scanner.next_event() {
        match event {
            RspEvent::Packet(payload) => {
                out.push(b"+".to_vec());
                let (tx, rx) = mpsc::channel();
                debugger.handle_gdb(GdbCommand::parse(&payload), tx);
                while debugger.is_running() {
                    debugger.advance().unwrap();
                }
                if let Ok(response) = rx.try_recv() {
                    out.push(encode_packet(&response.to_payload()));
                }
            }
            RspEvent::ChecksumMismatch { .. } => out.push(b"-".to_vec()),
            RspEvent::Interrupt => debugger.gdb_interrupt(),
        }
    }
    out
}

#[test]
fn test_memory_read_reply() {
    let mut debugger = setup();
    let mut scanner = PacketScanner::new();
    let replies = exchange(&mut debugger, &mut scanner, &packet("m1000,4"));
    assert_eq!(replies, vec![b"+".to_vec(), packet("deadbeef")]);
}

#[test]
fn test_breakpoint_then_continue_reports_swbreak() {
    let mut debugger = setup();
    let mut scanner = PacketScanner::new();

    let replies = exchange(&mut debugger, &mut scanner, &packet("Z1,2000,4"));
    assert_eq!(replies, vec![b"+".to_vec(), packet("OK")]);

    let replies = exchange(&mut debugger, &mut scanner, &packet("c"));
    assert_eq!(replies, vec![b"+".to_vec(), b"$T05swbreak:;#1d".to_vec()]);
    assert_eq!(debugger.scheduler().pc(), 0x2000);
}

#[test]
fn test_bad_checksum_is_nacked_and_stream_continues() {
    let mut debugger = setup();
    let mut scanner = PacketScanner::new();

    let mut bytes = b"$g#00".to_vec();
    bytes.extend_from_slice(&packet("qC"));
    let replies = exchange(&mut debugger, &mut scanner, &bytes);
    assert_eq!(replies, vec![b"-".to_vec(), b"+".to_vec(), packet("QC1")]);
    assert_eq!(scanner.pending(), 0);
}

#[test]
fn test_binary_write_with_escapes() {
    let mut debugger = setup();
    let mut scanner = PacketScanner::new();

    // 0x23 ('#') と 0x7d ('}') をエスケープして書き込む
    let mut payload = b"X1000,2:".to_vec();
    payload.extend_from_slice(&[0x23, 0x7d]);
    let replies = exchange(&mut debugger, &mut scanner, &encode_packet(&payload));
    assert_eq!(replies, vec![b"+".to_vec(), packet("OK")]);

    assert_eq!(
        debugger.execute_gdb(GdbCommand::parse(b"m1000,4")),
        GdbOutcome::Reply(synapse_proto::Response::Hex(vec![0x23, 0x7d, 0xbe, 0xef]))
    );
}
