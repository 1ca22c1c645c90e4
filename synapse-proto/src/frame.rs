//! 長さ付きフレーム
//!
//! ```text
//! +----------------+----------------------------------------+
//! | length (u32 BE)| payload (length bytes, 先頭4バイトがタグ)    |
//! +----------------+----------------------------------------+
//! ```

use crate::error::ProtoError;
use crate::message::Message;
use crate::Result;

/// 長さプレフィックスのバイト数
pub const LENGTH_PREFIX_LEN: usize = 4;

/// 受け入れるペイロードの最大長
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// メッセージをフレームにエンコードする
pub fn encode_frame(message: &Message) -> Vec<u8> {
    let payload = message.encode();
    let mut out = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// ストリームからフレームを切り出すデコーダ
///
/// 任意の位置で分割された読み取りを蓄積し、長さプレフィックスを読んだ後は
/// その長さのペイロードが揃うまで待ちます。1フレームを取り出した後に
/// 次のフレームのバイトを失うことはありません。
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    needed: Option<usize>,
}

impl FrameDecoder {
    /// 新しいデコーダを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信したバイト列を追加し、完成したペイロードを返す
    ///
    /// 長さが上限を超えるフレームはストリームを同期し直せないのでエラーになります。
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        loop {
            if self.needed.is_none() {
                if self.buf.len() < LENGTH_PREFIX_LEN {
                    break;
                }
                let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
                if len > MAX_FRAME_LEN {
                    return Err(ProtoError::FrameTooLarge { len, max: MAX_FRAME_LEN });
                }
                self.buf.drain(..LENGTH_PREFIX_LEN);
                self.needed = Some(len);
            }

            match self.needed {
                Some(len) if self.buf.len() >= len => {
                    payloads.push(self.buf.drain(..len).collect());
                    self.needed = None;
                }
                _ => break,
            }
        }

        Ok(payloads)
    }

    /// まだフレームになっていないバイト数
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
