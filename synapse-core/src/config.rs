//! デバッガの設定

use crate::errors::DebugError;
use crate::Result;
use std::time::Duration;

/// 1フレームあたりのサイクル数（継続実行の1スライス）
pub const DEFAULT_FRAME_CYCLES: u32 = 66666;

/// シンボルテーブルを探すメモリアドレス
pub const DEFAULT_SYMBOLS_ADDR: u32 = 0x30000;

/// デバッガコアの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// 継続実行時に1回で要求するサイクル数
    pub frame_cycles: u32,
    /// シンボルテーブルの先頭アドレス
    pub symbols_addr: u32,
    /// イベント待ちとスライス完了待ちの上限
    pub poll_interval: Duration,
    /// 読み込むシンボルの最大数
    pub max_symbols: usize,
    /// シンボル名の最大長
    pub max_symbol_len: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            frame_cycles: DEFAULT_FRAME_CYCLES,
            symbols_addr: DEFAULT_SYMBOLS_ADDR,
            poll_interval: Duration::from_millis(100),
            max_symbols: 4096,
            max_symbol_len: 256,
        }
    }
}

impl DebuggerConfig {
    /// 実行が進まなくなる設定を拒否する
    pub fn validate(&self) -> Result<()> {
        if self.frame_cycles == 0 {
            return Err(DebugError::InvalidConfig("frame cycles must be at least 1").into());
        }
        if self.poll_interval.is_zero() {
            return Err(DebugError::InvalidConfig("poll interval must be non-zero").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(DebuggerConfig::default().validate().is_ok());

        let config = DebuggerConfig {
            frame_cycles: 0,
            ..DebuggerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<DebugError>(),
            Some(&DebugError::InvalidConfig("frame cycles must be at least 1"))
        );

        let config = DebuggerConfig {
            poll_interval: Duration::ZERO,
            ..DebuggerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
