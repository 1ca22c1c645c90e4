//! 逆アセンブル機能
//!
//! メモリ上の命令ワードを1ワード1行のテキストにします。
//! ブレークポイントの元の命令とシンボル名は呼び出し側が重ねたものを使います。

use crate::symbols::SymbolTable;
use crate::Result;
use capstone::prelude::*;

/// 逆アセンブラのケーパビリティ
pub trait Disassembler: Send {
    /// `start` から並ぶ命令ワードを逆アセンブルする
    ///
    /// 返す行数は `words` の数と同じでなければなりません。
    fn disassemble(&self, start: u32, words: &[u32], symbols: &SymbolTable) -> Result<Vec<String>>;
}

/// capstone による ARM 逆アセンブラ
#[derive(Debug, Default, Clone, Copy)]
pub struct CapstoneDisassembler;

impl CapstoneDisassembler {
    pub fn new() -> Self {
        Self
    }
}

impl Disassembler for CapstoneDisassembler {
    fn disassemble(&self, start: u32, words: &[u32], symbols: &SymbolTable) -> Result<Vec<String>> {
        let cs = Capstone::new()
            .arm()
            .mode(arch::arm::ArchMode::Arm)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create Capstone: {}", e))?;

        let mut lines = Vec::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            let addr = start.wrapping_add(4 * i as u32);
            let insns = cs
                .disasm_count(&word.to_le_bytes(), u64::from(addr), 1)
                .map_err(|e| anyhow::anyhow!("Failed to disassemble: {}", e))?;

            // デコードできないワードはデータとして表示する
            let text = match insns.as_ref().first() {
                Some(insn) => format!(
                    "{} {}",
                    insn.mnemonic().unwrap_or(""),
                    insn.op_str().unwrap_or("")
                ),
                None => format!(".word 0x{:08x}", word),
            };
            lines.push(format_line(addr, *word, text.trim_end(), symbols));
        }
        Ok(lines)
    }
}

fn format_line(addr: u32, word: u32, text: &str, symbols: &SymbolTable) -> String {
    let mut line = format!("{:08x}: {:08x}  {}", addr, word, text);
    if let Some(name) = symbols.name_at(addr) {
        line = format!("{}  <{}>", line, name);
    }
    if let Some(target) = branch_target(addr, word) {
        if let (Some(name), offset) = symbols.lookup(target) {
            if offset == 0 {
                line = format!("{}  ; {}", line, name);
            } else {
                line = format!("{}  ; {}+0x{:x}", line, name, offset);
            }
        }
    }
    line
}

/// 条件付きでないことも含め、リンク付き分岐（BL）かどうか
pub fn is_branch_with_link(word: u32) -> bool {
    word >> 28 != 0xf && (word >> 24) & 0xf == 0b1011
}

/// B/BL 命令の分岐先アドレス
pub fn branch_target(addr: u32, word: u32) -> Option<u32> {
    if word >> 28 == 0xf || (word >> 25) & 0x7 != 0b101 {
        return None;
    }
    // 24ビットの符号付きワードオフセット
    let offset = (((word & 0x00ff_ffff) << 8) as i32 >> 6) as u32;
    Some(addr.wrapping_add(8).wrapping_add(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_with_link() {
        assert!(is_branch_with_link(0xeb00_0010)); // bl
        assert!(is_branch_with_link(0x0b00_0010)); // bleq
        assert!(!is_branch_with_link(0xea00_0010)); // b
        assert!(!is_branch_with_link(0xe3a0_0001)); // mov
        assert!(!is_branch_with_link(0xfb00_0010)); // blx
    }

    #[test]
    fn test_branch_target() {
        // pc + 8 + 0x10*4
        assert_eq!(branch_target(0x1000, 0xeb00_0010), Some(0x1048));
        // 後方への分岐
        assert_eq!(branch_target(0x1000, 0xeaff_fffe), Some(0x1000));
        assert_eq!(branch_target(0x1000, 0xe3a0_0001), None);
    }

    #[test]
    fn test_capstone_lines() {
        let symbols = SymbolTable::from_pairs(vec![(0x8000, "start".to_string())]);
        let words = [0xe3a0_0001, 0xeaff_fffd];
        let lines = CapstoneDisassembler::new().disassemble(0x8000, &words, &symbols).unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00008000: e3a00001  mov"));
        assert!(lines[0].ends_with("<start>"));
        assert!(lines[1].starts_with("00008004: eafffffd  b"));
        assert!(lines[1].ends_with("; start"));
    }
}
