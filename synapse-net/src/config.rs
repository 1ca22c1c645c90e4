//! 接続層の設定

use std::time::Duration;

/// 接続層の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    /// accept やソケット読み取りの待ち時間の上限（シャットダウンへの応答用）
    pub poll_interval: Duration,
    /// 切断中に再接続を試みる間隔
    pub reconnect_interval: Duration,
    /// 接続と書き込みの上限（相手が読まなくなったら切断する）
    pub write_timeout: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            reconnect_interval: Duration::from_millis(100),
            write_timeout: Duration::from_secs(1),
        }
    }
}
