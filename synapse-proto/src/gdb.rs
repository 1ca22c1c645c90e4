//! GDB RSP のコマンドと返信
//!
//! パケットのペイロードを型付きのコマンドに変換し、返信をペイロードに戻します。

use crate::hex::{from_hex, parse_u32, to_hex};
use crate::rsp::unescape;

/// 浮動小数点レジスタの数（値は常に0）
pub const FP_REGISTERS: usize = 8;
/// 浮動小数点レジスタ1本のバイト数
pub const FP_REGISTER_SIZE: usize = 12;
/// `p` / `P` で使うfpsレジスタの番号
pub const FPS_REGNUM: usize = 16 + FP_REGISTERS;
/// `p` / `P` で使うモード（cpsr）レジスタの番号
pub const CPSR_REGNUM: usize = FPS_REGNUM + 1;

/// ブレークポイント・ウォッチポイントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Software,
    Hardware,
    Write,
    Read,
    Access,
}

impl PointKind {
    fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'0' => Some(PointKind::Software),
            b'1' => Some(PointKind::Hardware),
            b'2' => Some(PointKind::Write),
            b'3' => Some(PointKind::Read),
            b'4' => Some(PointKind::Access),
            _ => None,
        }
    }

    /// ブレークポイント（0, 1）かどうか
    pub fn is_breakpoint(self) -> bool {
        matches!(self, PointKind::Software | PointKind::Hardware)
    }
}

/// `z` / `Z` の引数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub kind: PointKind,
    pub addr: u32,
    pub len: u32,
}

/// `q` のサブコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Supported,
    CurrentThread,
    FirstThreadInfo,
    SubsequentThreadInfo,
    Attached,
    Unknown(String),
}

/// デコードされたRSPコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GdbCommand {
    /// `?`
    HaltReason,
    /// `g`
    ReadRegisters,
    /// `G`
    WriteRegisters(Vec<u8>),
    /// `p`
    ReadRegister(usize),
    /// `P`
    WriteRegister(usize, Vec<u8>),
    /// `m`
    ReadMemory { addr: u32, len: usize },
    /// `M` / `X`
    WriteMemory { addr: u32, data: Vec<u8> },
    /// `c` / `C`
    Continue(Option<u32>),
    /// `s` / `S`
    Step(Option<u32>),
    /// `D`
    Detach,
    /// `k`
    Kill,
    /// `H`
    SetThread,
    /// `q...`
    Query(Query),
    /// `Z`
    InsertPoint(Point),
    /// `z`
    RemovePoint(Point),
    /// 引数の形式が正しくない
    Malformed,
    /// 未対応のコマンド
    Unsupported,
}

impl GdbCommand {
    /// パケットのペイロード（エスケープ済み）をコマンドにする
    pub fn parse(payload: &[u8]) -> Self {
        let Some((&first, rest)) = payload.split_first() else {
            return GdbCommand::Unsupported;
        };

        // X だけは生のバイナリを含むので文字列にする前に処理する
        if first == b'X' {
            return parse_binary_write(rest).unwrap_or(GdbCommand::Malformed);
        }

        let Ok(args) = std::str::from_utf8(rest) else {
            return GdbCommand::Malformed;
        };

        let parsed = match first {
            b'?' => Some(GdbCommand::HaltReason),
            b'g' => Some(GdbCommand::ReadRegisters),
            b'G' => from_hex(args).map(GdbCommand::WriteRegisters),
            b'p' => parse_usize(args).map(GdbCommand::ReadRegister),
            b'P' => args.split_once('=').and_then(|(reg, value)| {
                Some(GdbCommand::WriteRegister(parse_usize(reg)?, from_hex(value)?))
            }),
            b'm' => parse_addr_len(args).map(|(addr, len)| GdbCommand::ReadMemory { addr, len }),
            b'M' => args.split_once(':').and_then(|(range, data)| {
                let (addr, len) = parse_addr_len(range)?;
                let data = from_hex(data)?;
                (data.len() == len).then_some(GdbCommand::WriteMemory { addr, data })
            }),
            b'c' => parse_resume_addr(args).map(GdbCommand::Continue),
            b's' => parse_resume_addr(args).map(GdbCommand::Step),
            b'C' => parse_signal_resume(args).map(GdbCommand::Continue),
            b'S' => parse_signal_resume(args).map(GdbCommand::Step),
            b'D' => Some(GdbCommand::Detach),
            b'k' => Some(GdbCommand::Kill),
            b'H' => Some(GdbCommand::SetThread),
            b'q' => Some(GdbCommand::Query(parse_query(args))),
            b'Z' => return parse_point(args).map_or(GdbCommand::Malformed, GdbCommand::InsertPoint),
            b'z' => return parse_point(args).map_or(GdbCommand::Malformed, GdbCommand::RemovePoint),
            _ => return GdbCommand::Unsupported,
        };
        parsed.unwrap_or(GdbCommand::Malformed)
    }
}

fn parse_usize(s: &str) -> Option<usize> {
    parse_u32(s).map(|v| v as usize)
}

fn parse_addr_len(s: &str) -> Option<(u32, usize)> {
    let (addr, len) = s.split_once(',')?;
    Some((parse_u32(addr)?, parse_usize(len)?))
}

fn parse_resume_addr(s: &str) -> Option<Option<u32>> {
    if s.is_empty() {
        return Some(None);
    }
    parse_u32(s).map(Some)
}

fn parse_signal_resume(s: &str) -> Option<Option<u32>> {
    // シグナル番号は無視する
    match s.split_once(';') {
        Some((signal, addr)) => {
            parse_u32(signal)?;
            parse_u32(addr).map(Some)
        }
        None => parse_u32(s).map(|_| None),
    }
}

fn parse_binary_write(rest: &[u8]) -> Option<GdbCommand> {
    let colon = rest.iter().position(|b| *b == b':')?;
    let header = std::str::from_utf8(&rest[..colon]).ok()?;
    let (addr, len) = parse_addr_len(header)?;
    let data = unescape(&rest[colon + 1..]).ok()?;
    (data.len() == len).then_some(GdbCommand::WriteMemory { addr, data })
}

fn parse_point(args: &str) -> Option<Point> {
    let kind = PointKind::from_digit(*args.as_bytes().first()?)?;
    let rest = args.get(1..)?.strip_prefix(',')?;
    // 条件リスト（;...）は無視する
    let fields = rest.split(';').next()?;
    let (addr, len) = fields.split_once(',')?;
    Some(Point {
        kind,
        addr: parse_u32(addr)?,
        len: parse_u32(len)?,
    })
}

fn parse_query(args: &str) -> Query {
    let name = args.split([':', ',', ';']).next().unwrap_or("");
    match name {
        "Supported" => Query::Supported,
        "C" => Query::CurrentThread,
        "fThreadInfo" => Query::FirstThreadInfo,
        "sThreadInfo" => Query::SubsequentThreadInfo,
        "Attached" => Query::Attached,
        other => Query::Unknown(other.to_string()),
    }
}

/// 停止理由の返信
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReply {
    /// `S<sig>`
    Signal(u8),
    /// ソフトウェアブレークポイント
    SoftwareBreak,
    /// ウォッチポイント
    Watch { kind: PointKind, addr: u32 },
    /// ステップ完了
    Trap,
    /// 0x03 による停止
    Interrupted,
}

/// RSPの返信
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `OK`
    Ok,
    /// 空のパケット（未対応）
    Empty,
    /// `Exx`
    Error(u8),
    /// バイト列を16進で
    Hex(Vec<u8>),
    /// 停止理由
    Stop(StopReply),
    /// そのまま送る文字列
    Text(String),
}

impl Response {
    /// 返信をペイロードにする
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            Response::Ok => b"OK".to_vec(),
            Response::Empty => Vec::new(),
            Response::Error(code) => format!("E{:02x}", code).into_bytes(),
            Response::Hex(bytes) => to_hex(bytes).into_bytes(),
            Response::Text(text) => text.clone().into_bytes(),
            Response::Stop(stop) => match stop {
                StopReply::Signal(sig) => format!("S{:02x}", sig).into_bytes(),
                StopReply::SoftwareBreak => b"T05swbreak:;".to_vec(),
                StopReply::Watch { kind, addr } => {
                    let name = match kind {
                        PointKind::Read => "rwatch",
                        PointKind::Access => "awatch",
                        _ => "watch",
                    };
                    format!("T05{}:{:08x};", name, addr).into_bytes()
                }
                StopReply::Trap => b"T05".to_vec(),
                StopReply::Interrupted => b"T02".to_vec(),
            },
        }
    }
}

/// `g` の返信に使うレジスタブロックを作る
///
/// 各32ビットワードはバイトスワップしてターゲット順（リトルエンディアン）に並べ、
/// 8本の12バイト浮動小数点レジスタ、fps、モードを続けます。
pub fn encode_register_block(registers: &[u32; 16], mode: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 * 4 + FP_REGISTERS * FP_REGISTER_SIZE + 8);
    for reg in registers {
        out.extend_from_slice(&reg.swap_bytes().to_be_bytes());
    }
    out.resize(out.len() + FP_REGISTERS * FP_REGISTER_SIZE, 0);
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&mode.swap_bytes().to_be_bytes());
    out
}

/// `G` のデータから汎用レジスタを取り出す
///
/// 16本に満たない分は `None` になります。
pub fn decode_register_block(data: &[u8]) -> [Option<u32>; 16] {
    let mut out = [None; 16];
    for (slot, chunk) in out.iter_mut().zip(data.chunks_exact(4)) {
        *slot = Some(decode_register(chunk));
    }
    out
}

/// ターゲット順の4バイトを値にする
pub fn decode_register(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    for (dst, src) in word.iter_mut().zip(bytes) {
        *dst = *src;
    }
    u32::from_be_bytes(word).swap_bytes()
}
