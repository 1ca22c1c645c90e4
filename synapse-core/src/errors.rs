//! デバッガのエラー型

use thiserror::Error;

/// デバッガ操作のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DebugError {
    /// 登録されていないウォッチIDの解除
    #[error("Memory watch {0} not found")]
    WatchNotFound(u32),

    /// テープカタログの範囲外
    #[error("Tape index {index} out of range (catalog has {len} entries)")]
    TapeOutOfRange { index: u32, len: usize },

    /// ピアが接続されていない
    #[error("No peer connected")]
    NotConnected,

    /// 設定値が不正
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
