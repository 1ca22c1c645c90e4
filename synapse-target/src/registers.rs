//! レジスタ状態

/// 汎用レジスタの数
pub const NUM_REGISTERS: usize = 16;

/// プログラムカウンタを兼ねるレジスタ番号
pub const PC_REGISTER: usize = 15;

/// ある時点のCPUレジスタ状態
///
/// スケジューラが要求に応じて作成し、送信後は変更されません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuState {
    pub registers: [u32; NUM_REGISTERS],
    pub mode: u32,
    pub pc: u32,
    pub waiting: bool,
}
