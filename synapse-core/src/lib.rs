//! Synapse デバッガのコア機能
//!
//! このクレートは、デバッガの中核となるロジックを提供します。
//! セッションの状態管理、プライベートプロトコルとGDBのコマンド実行、
//! シンボルテーブル、メモリウォッチ、テープカタログを統合します。

pub mod command;
pub mod config;
pub mod debugger;
pub mod disasm;
pub mod errors;
pub mod gdb;
pub mod outbound;
pub mod parse;
pub mod runner;
pub mod symbols;
pub mod tapes;
pub mod watch;

pub use command::Command;
pub use config::DebuggerConfig;
pub use debugger::{Debugger, RunState, StopCause};
pub use disasm::{CapstoneDisassembler, Disassembler};
pub use errors::DebugError;
pub use gdb::GdbOutcome;
pub use outbound::{Detached, Outbound};
pub use runner::{DebuggerLoop, Event};
pub use symbols::{Symbol, SymbolTable};
pub use tapes::{InvalidationSignal, TapeCatalog};
pub use watch::WatchRegistry;

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
