//! GDBリモートプロトコルのセッション
//!
//! パケットを受け取るたびに `+`/`-` で応答し、コマンドをデバッガへ渡します。
//! デバッガからの返信は接続ごとのチャネルで受け取り、ソケットの待ち時間の
//! 合間に書き出します。継続実行中でも 0x03 を受け付けられます。

use crate::listener::is_timeout;
use crate::Result;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;
use synapse_core::Event;
use synapse_proto::rsp::encode_packet;
use synapse_proto::{GdbCommand, PacketScanner, Response, RspEvent};
use synapse_target::ShutdownToken;
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

/// セッションの進行状況
struct Session<'a> {
    stream: TcpStream,
    events: &'a Sender<Event>,
    reply_tx: Sender<Response>,
    reply_rx: Receiver<Response>,
    /// 返信を待っているコマンドの数
    outstanding: usize,
    /// 返信を送り終えたら閉じる
    closing: bool,
}

impl Session<'_> {
    fn forward(&self, event: Event) -> bool {
        self.events.send(event).is_ok()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    fn write_reply(&mut self, response: Response) -> Result<()> {
        self.outstanding = self.outstanding.saturating_sub(1);
        let packet = encode_packet(&response.to_payload());
        debug!("-> {}", String::from_utf8_lossy(&packet));
        self.write(&packet)
    }

    /// 返信を待っていれば最大 `wait` だけ待ち、届いている返信をすべて書き出す
    fn flush_replies(&mut self, wait: Duration) -> Result<()> {
        if self.outstanding > 0 {
            if let Ok(response) = self.reply_rx.recv_timeout(wait) {
                self.write_reply(response)?;
            }
        }
        while let Ok(response) = self.reply_rx.try_recv() {
            self.write_reply(response)?;
        }
        Ok(())
    }

    /// スキャナから取り出したイベントを処理する
    fn handle(&mut self, event: RspEvent) -> Result<bool> {
        match event {
            RspEvent::Packet(payload) => {
                self.write(b"+")?;
                debug!("<- {}", String::from_utf8_lossy(&payload));
                let command = GdbCommand::parse(&payload);
                match command {
                    GdbCommand::Kill => {
                        let reply = self.reply_tx.clone();
                        self.forward(Event::Gdb { command, reply });
                        return Ok(false);
                    }
                    GdbCommand::Detach => self.closing = true,
                    _ => {}
                }
                self.outstanding += 1;
                let reply = self.reply_tx.clone();
                Ok(self.forward(Event::Gdb { command, reply }))
            }
            RspEvent::ChecksumMismatch { expected, actual } => {
                warn!(
                    "checksum mismatch (expected {:?}, computed 0x{:02x}), requesting retransmit",
                    expected, actual
                );
                self.write(b"-")?;
                Ok(true)
            }
            RspEvent::Interrupt => {
                debug!("<- interrupt");
                Ok(self.forward(Event::GdbInterrupt))
            }
        }
    }
}

/// GDBとの接続が終わるまで処理を続ける
///
/// 接続時にデバッガへ `GdbAttached` を、終了時に `GdbDetached` を送ります。
pub fn serve_gdb(
    stream: TcpStream,
    events: &Sender<Event>,
    shutdown: &ShutdownToken,
    poll: Duration,
) -> Result<()> {
    let (reply_tx, reply_rx) = mpsc::channel();
    let mut session = Session {
        stream,
        events,
        reply_tx,
        reply_rx,
        outstanding: 0,
        closing: false,
    };
    if !session.forward(Event::GdbAttached) {
        return Ok(());
    }

    let result = run(&mut session, shutdown, poll);
    let _ = events.send(Event::GdbDetached);
    result
}

fn run(session: &mut Session<'_>, shutdown: &ShutdownToken, poll: Duration) -> Result<()> {
    let mut scanner = PacketScanner::new();
    let mut buf = [0u8; READ_CHUNK];

    while !shutdown.is_triggered() {
        session.flush_replies(poll)?;
        if session.closing && session.outstanding == 0 {
            return Ok(());
        }

        let n = match session.stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        scanner.push(&buf[..n]);
        while let Some(event) = scanner.next_event() {
            if !session.handle(event)? {
                return Ok(());
            }
        }
    }
    Ok(())
}
