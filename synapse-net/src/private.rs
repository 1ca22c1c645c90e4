//! プライベートプロトコルのセッション
//!
//! 受信したバイト列をフレームに組み立て、メッセージにしてデバッガへ渡します。
//! 未知のメッセージ型はログに残して捨てます。

use crate::listener::is_timeout;
use crate::uplink::Uplink;
use crate::Result;
use std::io::Read;
use std::net::TcpStream;
use std::sync::mpsc::Sender;
use synapse_core::Event;
use synapse_proto::{FrameDecoder, Message, ProtoError};
use synapse_target::ShutdownToken;
use tracing::{debug, warn};

/// 1回の読み取りの大きさ
const READ_CHUNK: usize = 4096;

/// 接続が終わるまでメッセージを受信し続ける
///
/// 終了時にはデバッガへ `PeerLost` を送り、送信路を閉じます。
pub fn serve_private(
    mut stream: TcpStream,
    events: &Sender<Event>,
    uplink: &Uplink,
    shutdown: &ShutdownToken,
) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK];

    let result = loop {
        if shutdown.is_triggered() {
            break Ok(());
        }
        let n = match stream.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) if is_timeout(&e) => continue,
            Err(e) => break Err(e.into()),
        };

        let frames = match decoder.push(&buf[..n]) {
            Ok(frames) => frames,
            // 読み飛ばせないのでストリームの同期はもう取れない
            Err(e) => break Err(anyhow::anyhow!("Unrecoverable frame error: {}", e)),
        };
        if !deliver(frames, events, uplink) {
            break Ok(());
        }
    };

    uplink.disconnect();
    let _ = events.send(Event::PeerLost);
    result
}

/// フレームをデコードしてデバッガへ渡す
///
/// デバッガがもういなければ `false` を返します。
fn deliver(frames: Vec<Vec<u8>>, events: &Sender<Event>, uplink: &Uplink) -> bool {
    for payload in frames {
        let message = match Message::decode(&payload) {
            Ok(message) => message,
            Err(ProtoError::UnknownMessageType(tag)) => {
                warn!("dropping message with unknown type {}", tag);
                continue;
            }
            Err(e) => {
                warn!("dropping malformed message: {}", e);
                continue;
            }
        };
        debug!("received {:?}", message.message_type());

        match &message {
            Message::Connect(handshake) => {
                if let Err(e) = uplink.connect(handshake) {
                    warn!("{:#}", e);
                }
            }
            Message::Disconnect => uplink.disconnect(),
            _ => {}
        }
        if events.send(Event::Message(message)).is_err() {
            return false;
        }
    }
    true
}
