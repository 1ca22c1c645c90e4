//! ターゲット層のエラー

use thiserror::Error;

/// ターゲット操作で発生するエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    /// ブレークポイントのアドレスが4バイト境界にない
    #[error("breakpoint address 0x{0:08x} is not 4-byte aligned")]
    Alignment(u32),
    /// 登録されていないブレークポイントを解除しようとした
    #[error("no breakpoint at 0x{0:08x}")]
    BreakpointNotFound(u32),
    /// メモリ範囲外アクセス
    #[error("memory access out of range: 0x{addr:08x}+{len}")]
    OutOfRange { addr: u32, len: usize },
    /// スケジューラが停止している
    #[error("scheduler terminated")]
    SchedulerTerminated,
}
