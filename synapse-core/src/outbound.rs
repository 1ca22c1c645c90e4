//! ピアへの送信口
//!
//! デバッガは接続の詳細を知らず、このトレイトを通してメッセージを送ります。

#[cfg(test)]
use std::sync::Mutex;
use synapse_proto::Message;

/// プライベートプロトコルのピアへメッセージを送る口
pub trait Outbound: Send + Sync {
    /// メッセージを送る
    ///
    /// 接続がなければ黙って捨てます。
    fn send(&self, message: &Message);

    /// ピアが接続されているか
    fn is_connected(&self) -> bool;
}

/// どこにも送らない送信口
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl Outbound for Detached {
    fn send(&self, _message: &Message) {}

    fn is_connected(&self) -> bool {
        false
    }
}

/// 送ったメッセージを記録するだけの送信口
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Recorder {
    sent: Mutex<Vec<Message>>,
}

#[cfg(test)]
impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記録されたメッセージを取り出す
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
impl Outbound for Recorder {
    fn send(&self, message: &Message) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
    }

    fn is_connected(&self) -> bool {
        true
    }
}
