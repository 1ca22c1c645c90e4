//! Machine ケーパビリティ
//!
//! 命令セットの意味論とメモリ配列そのものは外部の実装が提供します。
//! このクレートの他の部分は、このトレイトを通してのみCPUに触れます。

use crate::registers::CpuState;
use crate::Result;

/// `Machine::step` の実行結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecStatus {
    /// 要求されたサイクルを実行し終えた
    #[default]
    Ok,
    /// トラップ命令に到達した（pcはトラップのアドレスを指す）
    Breakpoint,
    /// 割り込み待ちで停止している
    WaitingForInterrupt,
}

/// エミュレートされたCPUとメモリ
pub trait Machine: Send + 'static {
    /// 最大 `cycles` 命令を実行する
    ///
    /// ブレークポイントや割り込み待ちに到達した場合はそこで実行を打ち切ります。
    fn step(&mut self, cycles: u32) -> ExecStatus;

    /// 汎用レジスタを読み取る
    fn registers(&self) -> [u32; 16];

    /// 汎用レジスタに書き込む
    fn set_register(&mut self, index: usize, value: u32);

    /// 現在のプロセッサモード
    fn mode(&self) -> u32;

    /// プログラムカウンタ
    fn pc(&self) -> u32;

    /// 割り込み待ち状態かどうか
    fn is_waiting(&self) -> bool;

    /// 未処理の割り込みがあるかどうか
    fn interrupt_pending(&self) -> bool;

    /// 割り込み線をアサートする
    fn interrupt(&mut self, device_id: u32, code: u32);

    /// メモリを読み取る
    fn read_memory(&self, addr: u32, len: usize) -> Result<Vec<u8>>;

    /// メモリに書き込む
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// メモリイメージを新しいものに置き換える（電源の入れ直し）
    fn reset(&mut self);

    /// 命令ワードを読み取る（リトルエンディアン）
    fn read_word(&self, addr: u32) -> Result<u32> {
        let bytes = self.read_memory(addr, 4)?;
        let array: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("Failed to convert {} bytes to u32 array (expected 4 bytes)", bytes.len())
        })?;
        Ok(u32::from_le_bytes(array))
    }

    /// 命令ワードを書き込む（リトルエンディアン）
    fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        self.write_memory(addr, &value.to_le_bytes())
    }

    /// レジスタ一式のスナップショットを作る
    fn snapshot(&self) -> CpuState {
        CpuState {
            registers: self.registers(),
            mode: self.mode(),
            pc: self.pc(),
            waiting: self.is_waiting(),
        }
    }
}
