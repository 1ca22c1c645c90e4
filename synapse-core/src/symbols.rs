//! シンボル解決機能
//!
//! ターゲットのメモリ上に置かれたシンボルテーブルを読み取ります。
//! テーブルは（4バイトのビッグエンディアンのアドレス, NUL終端の名前）の並びで、
//! アドレス0で終わります。

use crate::Result;
use synapse_target::Machine;
use tracing::{debug, warn};

/// シンボル情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub address: u32,
    pub name: String,
}

/// アドレス順に並んだシンボルテーブル
///
/// 同じアドレスのシンボルは1つだけです。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// 空のテーブルを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// （アドレス, 名前）の組からテーブルを作る
    ///
    /// アドレスが重複した場合は最初のものを残します。
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, String)>) -> Self {
        let mut symbols: Vec<Symbol> = pairs
            .into_iter()
            .map(|(address, name)| Symbol { address, name })
            .collect();
        // 安定ソートなので重複時は先に出たものが残る
        symbols.sort_by_key(|s| s.address);
        symbols.dedup_by_key(|s| s.address);
        Self { symbols }
    }

    /// マシンのメモリからシンボルテーブルを読み取る
    ///
    /// 読み取れない領域に達した場合は、それまでに読めたシンボルを返します。
    /// ASCIIでない名前のシンボルは読み飛ばします。
    pub fn scan<M: Machine>(machine: &M, addr: u32, max_symbols: usize, max_name_len: usize) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut pos = addr;

        while pairs.len() < max_symbols {
            let address = match machine.read_memory(pos, 4) {
                Ok(bytes) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                Err(e) => {
                    warn!("symbol table at 0x{:08x} truncated: {}", pos, e);
                    break;
                }
            };
            if address == 0 {
                break;
            }
            pos = pos.wrapping_add(4);

            let mut name = Vec::new();
            loop {
                let byte = machine.read_memory(pos, 1)?[0];
                pos = pos.wrapping_add(1);
                if byte == 0 {
                    break;
                }
                if name.len() >= max_name_len {
                    anyhow::bail!("Symbol name at 0x{:08x} exceeds {} bytes", pos, max_name_len);
                }
                name.push(byte);
            }
            // ワイヤ上の名前はASCIIのみ
            match String::from_utf8(name) {
                Ok(name) if name.is_ascii() => pairs.push((address, name)),
                _ => warn!("skipping non-ASCII symbol name for 0x{:08x}", address),
            }
        }

        debug!("loaded {} symbols from 0x{:08x}", pairs.len(), addr);
        Ok(Self::from_pairs(pairs))
    }

    /// 最も近い手前のシンボルとそこからのオフセットを返す
    ///
    /// 最初のシンボルより前のアドレスでは `(None, addr)` を返します。
    pub fn lookup(&self, addr: u32) -> (Option<&str>, u32) {
        let idx = self.symbols.partition_point(|s| s.address <= addr);
        match idx.checked_sub(1).map(|i| &self.symbols[i]) {
            Some(sym) => (Some(sym.name.as_str()), addr - sym.address),
            None => (None, addr),
        }
    }

    /// アドレスに完全に一致するシンボル名
    pub fn name_at(&self, addr: u32) -> Option<&str> {
        self.symbols
            .binary_search_by_key(&addr, |s| s.address)
            .ok()
            .map(|idx| self.symbols[idx].name.as_str())
    }

    /// シンボル名からアドレスを解決する
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.symbols.iter().find(|s| s.name == name).map(|s| s.address)
    }

    /// すべてのシンボルを取得する
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// ワイヤ形式の（アドレス, 名前）の組にする
    pub fn to_pairs(&self) -> Vec<(u32, String)> {
        self.symbols.iter().map(|s| (s.address, s.name.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
