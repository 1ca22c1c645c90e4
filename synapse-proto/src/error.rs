//! コーデックのエラー

use thiserror::Error;

/// フレームやメッセージの解析エラー
///
/// コーデックの外へは伝播させず、セッション層でログに記録して破棄します。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// 未知のメッセージ種別
    #[error("unknown message type {0}")]
    UnknownMessageType(u32),
    /// ペイロードが短すぎる
    #[error("{context}: need {need} bytes, have {have}")]
    Truncated {
        context: &'static str,
        need: usize,
        have: usize,
    },
    /// 宣言された長さと実際の内容が一致しない
    #[error("{context}: declared {declared}, got {actual}")]
    LengthMismatch {
        context: &'static str,
        declared: usize,
        actual: usize,
    },
    /// フレームが大きすぎる
    #[error("frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },
    /// ASCIIでない文字列
    #[error("invalid text in {0}")]
    InvalidText(&'static str),
    /// 末尾が不完全なエスケープシーケンス
    #[error("dangling escape byte at end of data")]
    DanglingEscape,
}
