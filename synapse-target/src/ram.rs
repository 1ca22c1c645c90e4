//! フラットなRAMだけを持つ参照用マシン
//!
//! 命令デコードは行いません。トラップ命令と待機命令以外のワードはすべて
//! NOPとして扱い、1サイクルごとにpcを4進めます。テストとデモ用です。

use crate::breakpoint::TRAP_OPCODE;
use crate::errors::TargetError;
use crate::machine::{ExecStatus, Machine};
use crate::registers::{NUM_REGISTERS, PC_REGISTER};
use crate::Result;

/// 割り込みが来るまで待機する命令ワード（SWI 0x000001）
pub const WAIT_OPCODE: u32 = 0xef00_0001;

/// フラットなRAMマシン
pub struct RamMachine {
    memory: Vec<u8>,
    image: Vec<u8>,
    registers: [u32; NUM_REGISTERS],
    mode: u32,
    waiting: bool,
    pending_interrupts: Vec<(u32, u32)>,
    delivered: Vec<(u32, u32)>,
}

impl RamMachine {
    /// `size` バイトのゼロ初期化されたマシンを作成する
    pub fn new(size: usize) -> Self {
        Self::with_image(size, &[])
    }

    /// 先頭に `image` を配置したマシンを作成する
    ///
    /// `reset` はこのイメージを使ってメモリを作り直します。
    pub fn with_image(size: usize, image: &[u8]) -> Self {
        let mut memory = vec![0u8; size.max(image.len())];
        memory[..image.len()].copy_from_slice(image);
        Self {
            image: memory.clone(),
            memory,
            registers: [0; NUM_REGISTERS],
            mode: 0,
            waiting: false,
            pending_interrupts: Vec::new(),
            delivered: Vec::new(),
        }
    }

    /// これまでに処理された割り込み（デバイスID, コード）
    pub fn delivered_interrupts(&self) -> &[(u32, u32)] {
        &self.delivered
    }

    fn range(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.memory.len())
            .ok_or(TargetError::OutOfRange { addr, len })?;
        Ok(start..end)
    }

    fn fetch(&self, pc: u32) -> u32 {
        self.read_word(pc).unwrap_or(0)
    }

    fn next_pc(&self, pc: u32) -> u32 {
        let next = pc.wrapping_add(4);
        if next as usize >= self.memory.len() {
            0
        } else {
            next
        }
    }

    fn deliver_interrupt(&mut self) {
        if let Some(irq) = self.pending_interrupts.pop() {
            self.delivered.push(irq);
            self.waiting = false;
        }
    }
}

impl Machine for RamMachine {
    fn step(&mut self, cycles: u32) -> ExecStatus {
        for _ in 0..cycles {
            if !self.pending_interrupts.is_empty() {
                self.deliver_interrupt();
            }
            if self.waiting {
                return ExecStatus::WaitingForInterrupt;
            }

            let pc = self.pc();
            match self.fetch(pc) {
                TRAP_OPCODE => return ExecStatus::Breakpoint,
                WAIT_OPCODE => {
                    self.waiting = true;
                    self.registers[PC_REGISTER] = self.next_pc(pc);
                    return ExecStatus::WaitingForInterrupt;
                }
                _ => self.registers[PC_REGISTER] = self.next_pc(pc),
            }
        }
        ExecStatus::Ok
    }

    fn registers(&self) -> [u32; 16] {
        self.registers
    }

    fn set_register(&mut self, index: usize, value: u32) {
        if index < NUM_REGISTERS {
            self.registers[index] = value;
        }
    }

    fn mode(&self) -> u32 {
        self.mode
    }

    fn pc(&self) -> u32 {
        self.registers[PC_REGISTER]
    }

    fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn interrupt_pending(&self) -> bool {
        !self.pending_interrupts.is_empty()
    }

    fn interrupt(&mut self, device_id: u32, code: u32) {
        self.pending_interrupts.push((device_id, code));
    }

    fn read_memory(&self, addr: u32, len: usize) -> Result<Vec<u8>> {
        let range = self.range(addr, len)?;
        Ok(self.memory[range].to_vec())
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let range = self.range(addr, data.len())?;
        self.memory[range].copy_from_slice(data);
        Ok(())
    }

    fn reset(&mut self) {
        self.memory = self.image.clone();
        self.registers = [0; NUM_REGISTERS];
        self.mode = 0;
        self.waiting = false;
        self.pending_interrupts.clear();
    }
}
