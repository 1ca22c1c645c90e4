//! サーバー側からクライアントへの送信路
//!
//! クライアントはハンドシェイクで自分が待ち受けているホストとポートを伝えます。
//! サーバーはそこへ接続し直し、停止通知や状態をこの接続で送ります。

use crate::listener;
use crate::Result;
use std::io::Write;
use std::net::TcpStream;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use synapse_core::Outbound;
use synapse_proto::{encode_frame, Handshake, Message};
use tracing::{debug, info, warn};

/// クライアントへの送信路
///
/// 接続と書き込みは `timeout` で打ち切ります。読まなくなった相手への送信で
/// デバッガループが止まらないよう、タイムアウトした接続は捨てます。
#[derive(Debug)]
pub struct Uplink {
    stream: Mutex<Option<TcpStream>>,
    timeout: Duration,
}

impl Uplink {
    pub fn new(timeout: Duration) -> Self {
        Self {
            stream: Mutex::new(None),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<TcpStream>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ハンドシェイクで伝えられた宛先に接続する
    ///
    /// 既存の接続は置き換えます。
    pub fn connect(&self, handshake: &Handshake) -> Result<()> {
        let target = (handshake.host.as_str(), handshake.port);
        let stream = listener::connect(target, self.timeout)
            .map_err(|e| anyhow::anyhow!("Failed to connect back to {}:{}: {}", handshake.host, handshake.port, e))?;
        info!("uplink connected to {}:{}", handshake.host, handshake.port);
        *self.lock() = Some(stream);
        Ok(())
    }

    /// 接続を閉じる
    pub fn disconnect(&self) {
        if self.lock().take().is_some() {
            info!("uplink closed");
        }
    }
}

impl Outbound for Uplink {
    fn send(&self, message: &Message) {
        let mut guard = self.lock();
        let Some(stream) = guard.as_mut() else {
            return;
        };
        debug!("sending {:?}", message.message_type());
        if let Err(e) = stream.write_all(&encode_frame(message)) {
            if listener::is_timeout(&e) {
                warn!("uplink peer stopped reading for {:?}, dropping connection", self.timeout);
            } else {
                warn!("uplink write failed, dropping connection: {}", e);
            }
            *guard = None;
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().is_some()
    }
}
