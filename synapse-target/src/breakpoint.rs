//! ブレークポイント機能
//!
//! 命令ワードをトラップ命令で置き換え、元のワードを保存しておきます。

use crate::errors::TargetError;
use crate::machine::{ExecStatus, Machine};
use crate::scheduler::Scheduler;
use crate::Result;
use std::collections::BTreeMap;
use tracing::debug;

/// ブレークポイント用ソフトウェア割り込み番号
pub const SWI_BREAKPOINT: u32 = 0x00be_eeef;

/// トラップ命令のオペコード（SWI #SWI_BREAKPOINT）
pub const TRAP_OPCODE: u32 = 0xef00_0000 | SWI_BREAKPOINT;

/// ステップオーバーの手順
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOverPhase {
    /// 元の命令ワードを書き戻す
    Restore,
    /// 1命令だけ実行する
    Execute,
    /// トラップ命令を再び書き込む
    Reinstate,
}

const STEP_OVER_SEQUENCE: [StepOverPhase; 3] = [
    StepOverPhase::Restore,
    StepOverPhase::Execute,
    StepOverPhase::Reinstate,
];

/// ブレークポイントテーブル
///
/// アドレス（4バイト境界）から元の命令ワードへの対応を保持します。
/// 同じアドレスのレコードは1つだけです。
#[derive(Debug, Default, Clone)]
pub struct BreakpointTable {
    saved: BTreeMap<u32, u32>,
}

impl BreakpointTable {
    /// 空のテーブルを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// ブレークポイントを追加し、トラップ命令を書き込む
    ///
    /// 既に登録済みのアドレスなら何もせず `false` を返します。
    pub fn add<M: Machine>(&mut self, addr: u32, scheduler: &Scheduler<M>) -> Result<bool> {
        if addr % 4 != 0 {
            return Err(TargetError::Alignment(addr).into());
        }
        if self.saved.contains_key(&addr) {
            return Ok(false);
        }

        // 元のワードを保存してからトラップで置き換える
        let original = scheduler.with_machine(|m| -> Result<u32> {
            let word = m.read_word(addr)?;
            m.write_word(addr, TRAP_OPCODE)?;
            Ok(word)
        })?;
        debug!("breakpoint set at 0x{:08x} (saved 0x{:08x})", addr, original);
        self.saved.insert(addr, original);
        Ok(true)
    }

    /// ブレークポイントを削除し、元の命令ワードを書き戻す
    pub fn remove<M: Machine>(&mut self, addr: u32, scheduler: &Scheduler<M>) -> Result<()> {
        let original = *self
            .saved
            .get(&addr)
            .ok_or(TargetError::BreakpointNotFound(addr))?;
        scheduler.with_machine(|m| m.write_word(addr, original))?;
        self.saved.remove(&addr);
        debug!("breakpoint removed at 0x{:08x}", addr);
        Ok(())
    }

    /// 指定アドレスにブレークポイントがあるか
    pub fn contains(&self, addr: u32) -> bool {
        self.saved.contains_key(&addr)
    }

    /// 保存されている元の命令ワード
    pub fn original(&self, addr: u32) -> Option<u32> {
        self.saved.get(&addr).copied()
    }

    /// 登録済みのアドレスを昇順で返す
    pub fn addresses(&self) -> impl Iterator<Item = u32> + '_ {
        self.saved.keys().copied()
    }

    /// ブレークポイントの数
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// 範囲内のトラップ命令を元の命令ワードに置き換えて見せる
    ///
    /// `bytes` は `start` から読み取ったメモリ内容です。
    pub fn overlay(&self, start: u32, bytes: &mut [u8]) {
        let start = u64::from(start);
        let end = start + bytes.len() as u64;
        for (addr, original) in self.words_in(start, end) {
            for (i, b) in original.to_le_bytes().iter().enumerate() {
                let at = u64::from(addr) + i as u64;
                if at >= start && at < end {
                    bytes[(at - start) as usize] = *b;
                }
            }
        }
    }

    /// メモリに書き込み、範囲内のブレークポイントの保存ワードを更新する
    ///
    /// トラップ命令はそのまま残ります。
    pub fn write_through<M: Machine>(&mut self, addr: u32, data: &[u8], scheduler: &Scheduler<M>) -> Result<()> {
        let start = u64::from(addr);
        let end = start + data.len() as u64;
        scheduler.with_machine(|m| -> Result<()> {
            m.write_memory(addr, data)?;
            let lo = (start & !3) as u32;
            let hi = end.min(u64::from(u32::MAX) + 1);
            for (bp, original) in self.saved.range_mut(lo..).take_while(|(bp, _)| u64::from(**bp) < hi) {
                let mut bytes = original.to_le_bytes();
                for (i, b) in bytes.iter_mut().enumerate() {
                    let at = u64::from(*bp) + i as u64;
                    if at >= start && at < end {
                        *b = data[(at - start) as usize];
                    }
                }
                *original = u32::from_le_bytes(bytes);
                m.write_word(*bp, TRAP_OPCODE)?;
            }
            Ok(())
        })
    }

    fn words_in(&self, start: u64, end: u64) -> impl Iterator<Item = (u32, u32)> + '_ {
        let lo = (start & !3) as u32;
        self.saved
            .range(lo..)
            .take_while(move |(addr, _)| u64::from(**addr) < end)
            .map(|(addr, word)| (*addr, *word))
    }

    /// pcがブレークポイント上なら、その命令を1つ実行してトラップを戻す
    ///
    /// 実行した場合はそのステータスを返します。途中で失敗しても
    /// 元のワードを書き戻していればトラップは必ず再設定されます。
    pub fn step_over_if_needed<M: Machine>(&self, scheduler: &Scheduler<M>) -> Result<Option<ExecStatus>> {
        let pc = scheduler.pc();
        let Some(original) = self.original(pc) else {
            return Ok(None);
        };

        debug!("stepping over breakpoint at 0x{:08x}", pc);
        let mut restored = false;
        let mut outcome: Option<Result<ExecStatus>> = None;
        for phase in STEP_OVER_SEQUENCE {
            match phase {
                StepOverPhase::Restore => {
                    match scheduler.with_machine(|m| m.write_word(pc, original)) {
                        Ok(()) => restored = true,
                        Err(e) => outcome = Some(Err(e)),
                    }
                }
                StepOverPhase::Execute => {
                    if restored {
                        outcome = Some(scheduler.step_and_wait(1));
                    }
                }
                StepOverPhase::Reinstate => {
                    if restored {
                        scheduler.with_machine(|m| m.write_word(pc, TRAP_OPCODE))?;
                    }
                }
            }
        }

        match outcome {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }

    /// 新しいメモリイメージに全てのトラップ命令を書き込み直す
    ///
    /// 元の命令ワードはテーブルに保存されているものを使い、読み直しません。
    pub fn reapply_all<M: Machine>(&self, scheduler: &Scheduler<M>) -> Result<()> {
        scheduler.with_machine(|m| -> Result<()> {
            for addr in self.saved.keys() {
                m.write_word(*addr, TRAP_OPCODE)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::RamMachine;
    use crate::shutdown::ShutdownToken;

    fn scheduler_with(words: &[(u32, u32)]) -> Scheduler<RamMachine> {
        let mut machine = RamMachine::new(0x4000);
        for (addr, word) in words {
            machine.write_word(*addr, *word).unwrap();
        }
        Scheduler::new(machine, ShutdownToken::new()).unwrap()
    }

    fn word_at(scheduler: &Scheduler<RamMachine>, addr: u32) -> u32 {
        scheduler.with_machine(|m| m.read_word(addr).unwrap())
    }

    #[test]
    fn test_add_then_remove_restores_word() {
        let sched = scheduler_with(&[(0x100, 0xe3a0_0001), (0x104, 0xe12f_ff1e)]);
        let mut table = BreakpointTable::new();

        for addr in [0x100, 0x104, 0x108] {
            let before = word_at(&sched, addr);
            assert!(table.add(addr, &sched).unwrap());
            assert_eq!(word_at(&sched, addr), TRAP_OPCODE);
            table.remove(addr, &sched).unwrap();
            assert_eq!(word_at(&sched, addr), before);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_add_is_idempotent() {
        let sched = scheduler_with(&[(0x200, 0x1234_5678)]);
        let mut table = BreakpointTable::new();
        assert!(table.add(0x200, &sched).unwrap());

        // 2回目の追加でメモリに書き込まれないことを確認する
        sched.with_machine(|m| m.write_word(0x200, 0xdead_beef).unwrap());
        assert!(!table.add(0x200, &sched).unwrap());
        assert_eq!(word_at(&sched, 0x200), 0xdead_beef);
        assert_eq!(table.original(0x200), Some(0x1234_5678));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unaligned_add_rejected() {
        let sched = scheduler_with(&[(0x300, 0xaabb_ccdd)]);
        let mut table = BreakpointTable::new();
        let err = table.add(0x302, &sched).unwrap_err();
        assert_eq!(err.downcast_ref::<TargetError>(), Some(&TargetError::Alignment(0x302)));
        assert_eq!(word_at(&sched, 0x300), 0xaabb_ccdd);
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_unknown() {
        let sched = scheduler_with(&[]);
        let mut table = BreakpointTable::new();
        let err = table.remove(0x40, &sched).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TargetError>(),
            Some(&TargetError::BreakpointNotFound(0x40))
        );
    }

    #[test]
    fn test_step_over_reinstates_trap() {
        let sched = scheduler_with(&[]);
        let mut table = BreakpointTable::new();
        table.add(0x0, &sched).unwrap();

        assert_eq!(sched.step_and_wait(10).unwrap(), ExecStatus::Breakpoint);
        assert_eq!(sched.pc(), 0);

        assert_eq!(table.step_over_if_needed(&sched).unwrap(), Some(ExecStatus::Ok));
        assert_eq!(sched.pc(), 4);
        assert_eq!(word_at(&sched, 0), TRAP_OPCODE);

        // pcがブレークポイント上でなければ何もしない
        assert_eq!(table.step_over_if_needed(&sched).unwrap(), None);
        assert_eq!(sched.pc(), 4);
    }

    #[test]
    fn test_overlay_and_write_through() {
        let sched = scheduler_with(&[(0x40, 0x1122_3344)]);
        let mut table = BreakpointTable::new();
        table.add(0x40, &sched).unwrap();

        let mut bytes = sched.with_machine(|m| m.read_memory(0x3e, 4).unwrap());
        table.overlay(0x3e, &mut bytes);
        assert_eq!(bytes, vec![0, 0, 0x44, 0x33]);

        table.write_through(0x42, &[0xaa, 0xbb], &sched).unwrap();
        assert_eq!(table.original(0x40), Some(0xbbaa_3344));
        assert_eq!(word_at(&sched, 0x40), TRAP_OPCODE);
    }

    #[test]
    fn test_reapply_after_reset() {
        let sched = scheduler_with(&[]);
        let mut table = BreakpointTable::new();
        table.add(0x10, &sched).unwrap();
        table.add(0x20, &sched).unwrap();

        sched.reset();
        assert_eq!(word_at(&sched, 0x10), 0);
        table.reapply_all(&sched).unwrap();
        assert_eq!(word_at(&sched, 0x10), TRAP_OPCODE);
        assert_eq!(word_at(&sched, 0x20), TRAP_OPCODE);
        assert_eq!(table.original(0x10), Some(0));
    }
}
