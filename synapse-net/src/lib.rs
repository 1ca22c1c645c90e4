//! Synapse 接続層
//!
//! このクレートは、デバッガをTCPで公開するための機能を提供します。
//! サーバー側は2つのリスナー（プライベートプロトコルとGDB）とクライアントへの
//! 送信路を持ち、クライアント側は自分のリスナーと再接続の監視を持ちます。

pub mod client;
pub mod config;
pub mod harness;
pub mod listener;
pub mod private;
pub mod rsp;
pub mod uplink;

pub use client::DuplexClient;
pub use config::NetConfig;
pub use harness::{Harness, HarnessConfig};
pub use uplink::Uplink;

/// 接続層の結果型
pub type Result<T> = anyhow::Result<T>;
