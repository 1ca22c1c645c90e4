//! 独自プロトコルのメッセージカタログ
//!
//! ペイロードの先頭4バイトはビッグエンディアンのメッセージ種別です。
//! 各メッセージは対称なビッグエンディアンのバイナリ表現を持ちます。

use crate::error::ProtoError;
use crate::Result;

/// メッセージ種別タグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Connect = 1,
    Disconnect = 2,
    Stop = 3,
    Resume = 4,
    Step = 5,
    Restart = 6,
    SetBreakpoint = 7,
    UnsetBreakpoint = 8,
    MemData = 9,
    MemWatch = 10,
    Unwatch = 11,
    State = 12,
    Disassembly = 13,
    DisassemblyData = 14,
    TapeRequest = 15,
    TapeList = 16,
    TapeLoad = 17,
    TapeUnload = 18,
    SymbolData = 19,
    Next = 20,
}

impl MessageType {
    const ALL: [MessageType; 20] = [
        MessageType::Connect,
        MessageType::Disconnect,
        MessageType::Stop,
        MessageType::Resume,
        MessageType::Step,
        MessageType::Restart,
        MessageType::SetBreakpoint,
        MessageType::UnsetBreakpoint,
        MessageType::MemData,
        MessageType::MemWatch,
        MessageType::Unwatch,
        MessageType::State,
        MessageType::Disassembly,
        MessageType::DisassemblyData,
        MessageType::TapeRequest,
        MessageType::TapeList,
        MessageType::TapeLoad,
        MessageType::TapeUnload,
        MessageType::SymbolData,
        MessageType::Next,
    ];

    /// タグ値から種別を得る（タグは1から連番なので表引きになる）
    pub fn from_tag(tag: u32) -> Option<Self> {
        let index = (tag as usize).checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// ワイヤ上のタグ値
    pub fn tag(self) -> u32 {
        self as u32
    }
}

/// 接続ハンドシェイク
///
/// クライアント側も返信を受け取るためにリスナーを持つので、その待ち受けポートとホストを通知します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub host: String,
    pub port: u16,
}

/// CPUレジスタ状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MachineState {
    pub registers: [u32; 16],
    pub mode: u32,
    pub pc: u32,
    pub waiting: bool,
}

/// メモリビュー要求（MEMWATCH / DISASSEMBLY）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemView {
    pub id: u32,
    pub start: u32,
    pub size: u32,
    pub watch_start: u32,
    pub watch_size: u32,
}

/// メモリ内容の返信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemData {
    pub id: u32,
    pub start: u32,
    pub data: Vec<u8>,
}

/// 逆アセンブル結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblyData {
    pub start: u32,
    pub memory: Vec<u8>,
    pub lines: Vec<String>,
}

/// テープ一覧の要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeRequest {
    pub id: u32,
    pub start: u32,
    pub size: u32,
}

/// テープ一覧の返信
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeList {
    pub id: u32,
    pub start: u32,
    pub total: u32,
    pub names: Vec<String>,
}

/// 独自プロトコルのメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Connect(Handshake),
    Disconnect,
    Stop,
    Resume,
    Step,
    Restart,
    SetBreakpoint(u32),
    UnsetBreakpoint(u32),
    MemData(MemData),
    MemWatch(MemView),
    Unwatch(u32),
    State(MachineState),
    Disassembly(MemView),
    DisassemblyData(DisassemblyData),
    TapeRequest(TapeRequest),
    TapeList(TapeList),
    TapeLoad(u32),
    TapeUnload,
    /// シンボル表（空なら要求）
    SymbolData(Vec<(u32, String)>),
    Next,
}

impl Message {
    /// メッセージ種別
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Connect(_) => MessageType::Connect,
            Message::Disconnect => MessageType::Disconnect,
            Message::Stop => MessageType::Stop,
            Message::Resume => MessageType::Resume,
            Message::Step => MessageType::Step,
            Message::Restart => MessageType::Restart,
            Message::SetBreakpoint(_) => MessageType::SetBreakpoint,
            Message::UnsetBreakpoint(_) => MessageType::UnsetBreakpoint,
            Message::MemData(_) => MessageType::MemData,
            Message::MemWatch(_) => MessageType::MemWatch,
            Message::Unwatch(_) => MessageType::Unwatch,
            Message::State(_) => MessageType::State,
            Message::Disassembly(_) => MessageType::Disassembly,
            Message::DisassemblyData(_) => MessageType::DisassemblyData,
            Message::TapeRequest(_) => MessageType::TapeRequest,
            Message::TapeList(_) => MessageType::TapeList,
            Message::TapeLoad(_) => MessageType::TapeLoad,
            Message::TapeUnload => MessageType::TapeUnload,
            Message::SymbolData(_) => MessageType::SymbolData,
            Message::Next => MessageType::Next,
        }
    }

    /// タグを含むペイロードにエンコードする
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u32(&mut out, self.message_type().tag());

        match self {
            Message::Connect(handshake) => {
                out.extend_from_slice(&handshake.port.to_be_bytes());
                out.extend_from_slice(handshake.host.as_bytes());
            }
            Message::Disconnect
            | Message::Stop
            | Message::Resume
            | Message::Step
            | Message::Restart
            | Message::TapeUnload
            | Message::Next => {}
            Message::SetBreakpoint(value)
            | Message::UnsetBreakpoint(value)
            | Message::Unwatch(value)
            | Message::TapeLoad(value) => put_u32(&mut out, *value),
            Message::MemData(mem) => {
                put_u32(&mut out, mem.id);
                put_u32(&mut out, mem.start);
                put_u32(&mut out, mem.data.len() as u32);
                out.extend_from_slice(&mem.data);
            }
            Message::MemWatch(view) | Message::Disassembly(view) => {
                for value in [view.id, view.start, view.size, view.watch_start, view.watch_size] {
                    put_u32(&mut out, value);
                }
            }
            Message::State(state) => {
                for reg in state.registers {
                    put_u32(&mut out, reg);
                }
                put_u32(&mut out, state.mode);
                put_u32(&mut out, state.pc);
                out.push(if state.waiting { b'1' } else { 0 });
            }
            Message::DisassemblyData(dis) => {
                put_u32(&mut out, dis.start);
                put_u32(&mut out, dis.memory.len() as u32);
                out.extend_from_slice(&dis.memory);
                out.extend_from_slice(dis.lines.join("\n").as_bytes());
            }
            Message::TapeRequest(req) => {
                put_u32(&mut out, req.id);
                put_u32(&mut out, req.start);
                put_u32(&mut out, req.size);
            }
            Message::TapeList(list) => {
                put_u32(&mut out, list.id);
                put_u32(&mut out, list.start);
                put_u32(&mut out, list.names.len() as u32);
                put_u32(&mut out, list.total);
                out.extend_from_slice(list.names.join("\0").as_bytes());
            }
            Message::SymbolData(symbols) => {
                for (addr, name) in symbols {
                    put_u32(&mut out, *addr);
                    out.extend_from_slice(name.as_bytes());
                    out.push(0);
                }
            }
        }
        out
    }

    /// タグを含むペイロードをデコードする
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let tag = r.u32("message type")?;
        let kind = MessageType::from_tag(tag).ok_or(ProtoError::UnknownMessageType(tag))?;

        let message = match kind {
            MessageType::Connect => {
                let port = r.u16("handshake port")?;
                let host = ascii(r.rest(), "handshake host")?;
                Message::Connect(Handshake { host, port })
            }
            MessageType::Disconnect => Message::Disconnect,
            MessageType::Stop => Message::Stop,
            MessageType::Resume => Message::Resume,
            MessageType::Step => Message::Step,
            MessageType::Restart => Message::Restart,
            MessageType::Next => Message::Next,
            MessageType::TapeUnload => Message::TapeUnload,
            MessageType::SetBreakpoint => Message::SetBreakpoint(r.u32("breakpoint address")?),
            MessageType::UnsetBreakpoint => Message::UnsetBreakpoint(r.u32("breakpoint address")?),
            MessageType::Unwatch => Message::Unwatch(r.u32("watch id")?),
            MessageType::TapeLoad => Message::TapeLoad(r.u32("tape index")?),
            MessageType::MemData => {
                let id = r.u32("memdata id")?;
                let start = r.u32("memdata start")?;
                let size = r.u32("memdata size")? as usize;
                let data = r.rest();
                if data.len() != size {
                    return Err(ProtoError::LengthMismatch {
                        context: "memdata",
                        declared: size,
                        actual: data.len(),
                    });
                }
                Message::MemData(MemData { id, start, data: data.to_vec() })
            }
            MessageType::MemWatch => Message::MemWatch(r.mem_view()?),
            MessageType::Disassembly => Message::Disassembly(r.mem_view()?),
            MessageType::State => {
                let mut registers = [0u32; 16];
                for reg in registers.iter_mut() {
                    *reg = r.u32("state registers")?;
                }
                let mode = r.u32("state mode")?;
                let pc = r.u32("state pc")?;
                let waiting = r.u8("state waiting flag")? != 0;
                Message::State(MachineState { registers, mode, pc, waiting })
            }
            MessageType::DisassemblyData => {
                let start = r.u32("disassembly start")?;
                let length = r.u32("disassembly length")? as usize;
                let memory = r.bytes(length, "disassembly memory")?.to_vec();
                let text = ascii(r.rest(), "disassembly lines")?;
                let lines: Vec<String> = if text.is_empty() && length < 4 {
                    Vec::new()
                } else {
                    text.split('\n').map(str::to_string).collect()
                };
                if lines.len() != length / 4 {
                    return Err(ProtoError::LengthMismatch {
                        context: "disassembly lines",
                        declared: length / 4,
                        actual: lines.len(),
                    });
                }
                Message::DisassemblyData(DisassemblyData { start, memory, lines })
            }
            MessageType::TapeRequest => {
                let id = r.u32("tape request id")?;
                let start = r.u32("tape request start")?;
                let size = r.u32("tape request size")?;
                Message::TapeRequest(TapeRequest { id, start, size })
            }
            MessageType::TapeList => {
                let id = r.u32("tape list id")?;
                let start = r.u32("tape list start")?;
                let size = r.u32("tape list size")? as usize;
                let total = r.u32("tape list total")?;
                let text = ascii(r.rest(), "tape names")?;
                let names: Vec<String> = if size == 0 && text.is_empty() {
                    Vec::new()
                } else {
                    text.split('\0').map(str::to_string).collect()
                };
                if names.len() != size {
                    return Err(ProtoError::LengthMismatch {
                        context: "tape list",
                        declared: size,
                        actual: names.len(),
                    });
                }
                Message::TapeList(TapeList { id, start, total, names })
            }
            MessageType::SymbolData => {
                let mut symbols = Vec::new();
                while !r.is_empty() {
                    let addr = r.u32("symbol address")?;
                    let name = r.cstr("symbol name")?;
                    symbols.push((addr, name));
                }
                Message::SymbolData(symbols)
            }
        };
        Ok(message)
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn ascii(bytes: &[u8], context: &'static str) -> Result<String> {
    if !bytes.is_ascii() {
        return Err(ProtoError::InvalidText(context));
    }
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtoError::InvalidText(context))
}

/// ビッグエンディアンの読み取りカーソル
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8]> {
        let have = self.buf.len() - self.pos;
        if have < n {
            return Err(ProtoError::Truncated { context, need: n, have });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self, context: &'static str) -> Result<u8> {
        Ok(self.bytes(1, context)?[0])
    }

    fn u16(&mut self, context: &'static str) -> Result<u16> {
        let b = self.bytes(2, context)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, context: &'static str) -> Result<u32> {
        let b = self.bytes(4, context)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn cstr(&mut self, context: &'static str) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let nul = rest.iter().position(|b| *b == 0).ok_or(ProtoError::Truncated {
            context,
            need: rest.len() + 1,
            have: rest.len(),
        })?;
        let name = ascii(&rest[..nul], context)?;
        self.pos += nul + 1;
        Ok(name)
    }

    fn mem_view(&mut self) -> Result<MemView> {
        Ok(MemView {
            id: self.u32("memview id")?,
            start: self.u32("memview start")?,
            size: self.u32("memview size")?,
            watch_start: self.u32("memview watch_start")?,
            watch_size: self.u32("memview watch_size")?,
        })
    }
}
