//! デバッガコマンド
//!
//! クライアントのREPLで入力されたコマンドをパースし、
//! プライベートプロトコルのメッセージに変換します。

use crate::parse::{parse_address, parse_number};
use synapse_proto::{MemView, Message, TapeRequest};

/// 逆アセンブル表示の既定のバイト数
pub const DEFAULT_DISASSEMBLY_SIZE: u32 = 0x40;

/// テープ一覧の既定の件数
pub const DEFAULT_TAPE_WINDOW: u32 = 16;

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを設定
    Break(u32),
    /// ブレークポイントを削除
    Delete(u32),
    /// 実行継続
    Continue,
    /// 実行停止
    Stop,
    /// ステップ実行
    Step,
    /// 関数呼び出しをまたいで次へ
    Next,
    /// マシンの再起動
    Restart,
    /// メモリウォッチを登録（ID, 開始, サイズ）
    Watch { id: u32, start: u32, size: u32 },
    /// メモリウォッチを解除
    Unwatch(u32),
    /// 逆アセンブル表示
    Disassemble { start: u32, size: u32 },
    /// シンボル一覧
    Symbols,
    /// テープ一覧
    Tapes { start: u32, size: u32 },
    /// テープを挿入
    Load(u32),
    /// テープを取り出す
    Unload,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let arg = |i: usize| parts.get(i).and_then(|s| parse_address(s).ok());
        let num_or = |i: usize, default: u32| match parts.get(i) {
            Some(s) => parse_number(s).ok(),
            None => Some(default),
        };

        match parts[0] {
            "break" | "b" => arg(1).map(Command::Break),
            "delete" | "d" => arg(1).map(Command::Delete),
            "continue" | "c" => Some(Command::Continue),
            "stop" => Some(Command::Stop),
            "step" | "s" => Some(Command::Step),
            "next" | "n" => Some(Command::Next),
            "restart" => Some(Command::Restart),
            "watch" | "w" => Some(Command::Watch {
                id: arg(1)?,
                start: arg(2)?,
                size: num_or(3, 4)?,
            }),
            "unwatch" => arg(1).map(Command::Unwatch),
            "disas" | "x" => Some(Command::Disassemble {
                start: arg(1)?,
                size: num_or(2, DEFAULT_DISASSEMBLY_SIZE)?,
            }),
            "symbols" | "sym" => Some(Command::Symbols),
            "tapes" => Some(Command::Tapes {
                start: num_or(1, 0)?,
                size: num_or(2, DEFAULT_TAPE_WINDOW)?,
            }),
            "load" => arg(1).map(Command::Load),
            "unload" => Some(Command::Unload),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }

    /// 送信するメッセージ
    ///
    /// ローカルで完結するコマンドは `None` を返します。
    pub fn to_message(&self) -> Option<Message> {
        let message = match *self {
            Command::Break(addr) => Message::SetBreakpoint(addr),
            Command::Delete(addr) => Message::UnsetBreakpoint(addr),
            Command::Continue => Message::Resume,
            Command::Stop => Message::Stop,
            Command::Step => Message::Step,
            Command::Next => Message::Next,
            Command::Restart => Message::Restart,
            Command::Watch { id, start, size } => Message::MemWatch(MemView {
                id,
                start,
                size,
                watch_start: start,
                watch_size: size,
            }),
            Command::Unwatch(id) => Message::Unwatch(id),
            Command::Disassemble { start, size } => Message::Disassembly(MemView {
                id: 0,
                start,
                size,
                watch_start: 0,
                watch_size: 0,
            }),
            Command::Symbols => Message::SymbolData(Vec::new()),
            Command::Tapes { start, size } => Message::TapeRequest(TapeRequest { id: 0, start, size }),
            Command::Load(index) => Message::TapeLoad(index),
            Command::Unload => Message::TapeUnload,
            Command::Help | Command::Quit => return None,
        };
        Some(message)
    }
}
