//! Synapse ターゲットマシン制御
//!
//! このクレートは、エミュレートされたCPUを安全に操作するための低レベル機能を提供します。
//! Machine ケーパビリティ、実行スレッドを所有するスケジューラ、
//! トラップ命令によるブレークポイントのパッチ管理などを行います。

pub mod breakpoint;
pub mod errors;
pub mod machine;
pub mod ram;
pub mod registers;
pub mod scheduler;
pub mod shutdown;

pub use breakpoint::{BreakpointTable, TRAP_OPCODE};
pub use errors::TargetError;
pub use machine::{ExecStatus, Machine};
pub use ram::RamMachine;
pub use registers::{CpuState, NUM_REGISTERS, PC_REGISTER};
pub use scheduler::Scheduler;
pub use shutdown::ShutdownToken;

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
