//! GDB Remote Serial Protocol のパケット層
//!
//! パケットは `$<payload>#<checksum>` の形で、チェックサムはペイロードの
//! バイト和の下位8ビットを2桁の16進数で表したものです。
//! `}` の後ろに `X ^ 0x20` を置くとバイト `X`（`#` `$` `}`）を表します。

use crate::error::ProtoError;
use crate::Result;
use tracing::warn;

/// エスケープ文字
pub const ESCAPE: u8 = b'}';

/// 帯域外の停止要求（Ctrl-C）
pub const INTERRUPT: u8 = 0x03;

/// 受信側で1パケットとして待つ最大長
pub const MAX_PACKET_LEN: usize = 0x4000;

/// ペイロードのチェックサム
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn needs_escape(b: u8) -> bool {
    matches!(b, b'#' | b'$' | b'}')
}

/// バイナリデータをエスケープする
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if needs_escape(b) {
            out.push(ESCAPE);
            out.push(b ^ 0x20);
        } else {
            out.push(b);
        }
    }
    out
}

/// エスケープを元に戻す
pub fn unescape(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&b) = iter.next() {
        if b == ESCAPE {
            let next = iter.next().ok_or(ProtoError::DanglingEscape)?;
            out.push(next ^ 0x20);
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

/// ペイロードをパケットに包む
///
/// ペイロードはエスケープされ、チェックサムは送信するバイト列に対して計算されます。
pub fn encode_packet(payload: &[u8]) -> Vec<u8> {
    let body = escape(payload);
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(b'$');
    out.extend_from_slice(&body);
    out.extend_from_slice(format!("#{:02x}", checksum(&body)).as_bytes());
    out
}

/// ストリームから取り出したイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RspEvent {
    /// チェックサムが一致したパケットのペイロード（エスケープ済みのまま）
    Packet(Vec<u8>),
    /// チェックサムが一致しなかった
    ChecksumMismatch { expected: Option<u8>, actual: u8 },
    /// 0x03 による停止要求
    Interrupt,
}

/// 受信バイト列からパケットを探すスキャナ
///
/// ACK（`+` / `-`）はパーサの状態に影響せず読み捨てます。
/// 走査したバイトは結果にかかわらずバッファから取り除かれます。
#[derive(Debug, Default)]
pub struct PacketScanner {
    buf: Vec<u8>,
}

impl PacketScanner {
    /// 新しいスキャナを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 受信したバイト列を追加する
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// まだ処理していないバイト数
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// 次のイベントを取り出す
    pub fn next_event(&mut self) -> Option<RspEvent> {
        loop {
            let first = *self.buf.first()?;
            match first {
                b'+' | b'-' => {
                    self.buf.remove(0);
                }
                INTERRUPT => {
                    self.buf.remove(0);
                    return Some(RspEvent::Interrupt);
                }
                b'$' => {
                    let Some(hash) = self.buf.iter().position(|b| *b == b'#') else {
                        if self.buf.len() > MAX_PACKET_LEN {
                            warn!("dropping {} bytes of unterminated packet", self.buf.len());
                            self.buf.clear();
                        }
                        return None;
                    };
                    if self.buf.len() < hash + 3 {
                        return None;
                    }

                    let packet: Vec<u8> = self.buf.drain(..hash + 3).collect();
                    let payload = &packet[1..hash];
                    let actual = checksum(payload);
                    let expected = std::str::from_utf8(&packet[hash + 1..hash + 3])
                        .ok()
                        .and_then(|digits| u8::from_str_radix(digits, 16).ok());

                    if expected == Some(actual) {
                        return Some(RspEvent::Packet(payload.to_vec()));
                    }
                    return Some(RspEvent::ChecksumMismatch { expected, actual });
                }
                other => {
                    warn!("discarding stray byte 0x{:02x} outside packet", other);
                    self.buf.remove(0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_of_g() {
        assert_eq!(checksum(b"g"), 0x67);
        assert_eq!(encode_packet(b"g"), b"$g#67".to_vec());
        assert_eq!(encode_packet(b""), b"$#00".to_vec());
    }

    #[test]
    fn test_escape_hash() {
        assert_eq!(escape(&[0x23]), vec![0x7d, 0x03]);
        assert_eq!(unescape(&[0x7d, 0x03]).unwrap(), vec![0x23]);
        let data = [b'$', 0x00, b'}', b'#', 0x41];
        assert_eq!(unescape(&escape(&data)).unwrap(), data.to_vec());
        assert_eq!(unescape(&[0x41, 0x7d]), Err(ProtoError::DanglingEscape));
    }

    #[test]
    fn test_scanner_with_acks_and_interrupt() {
        let mut scanner = PacketScanner::new();
        scanner.push(b"+$g#67+\x03$m1000,4#");
        assert_eq!(scanner.next_event(), Some(RspEvent::Packet(b"g".to_vec())));
        assert_eq!(scanner.next_event(), Some(RspEvent::Interrupt));
        assert_eq!(scanner.next_event(), None);

        scanner.push(b"8");
        assert_eq!(scanner.next_event(), None);
        scanner.push(b"e");
        assert_eq!(scanner.next_event(), Some(RspEvent::Packet(b"m1000,4".to_vec())));
        assert_eq!(scanner.pending(), 0);
    }

    #[test]
    fn test_scanner_bad_checksum_is_discarded() {
        let mut scanner = PacketScanner::new();
        scanner.push(b"$g#00$g#67");
        assert_eq!(
            scanner.next_event(),
            Some(RspEvent::ChecksumMismatch { expected: Some(0), actual: 0x67 })
        );
        assert_eq!(scanner.next_event(), Some(RspEvent::Packet(b"g".to_vec())));
        assert_eq!(scanner.next_event(), None);
    }
}
