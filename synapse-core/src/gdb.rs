//! GDBリモートプロトコルのコマンド実行
//!
//! パース済みの `GdbCommand` をデバッガへの操作に変換し、返信を作ります。
//! 継続実行の返信は停止するまで保留されます。

use crate::debugger::{Debugger, StopCause};
use crate::Result;
use std::sync::mpsc::Sender;
use synapse_proto::gdb::{
    decode_register, decode_register_block, encode_register_block, CPSR_REGNUM, FPS_REGNUM,
    FP_REGISTER_SIZE,
};
use synapse_proto::{GdbCommand, Point, PointKind, Query, Response, StopReply};
use synapse_target::{ExecStatus, Machine, TargetError, NUM_REGISTERS, PC_REGISTER};
use tracing::{debug, info};

/// 引数が不正
pub const E_BAD_ARGS: u8 = 0x01;
/// ブレークポイントが見つからない（ENOENT）
pub const E_NOT_FOUND: u8 = 0x02;
/// メモリにアクセスできない（EFAULT）
pub const E_FAULT: u8 = 0x0e;
/// アドレスの境界が不正（EINVAL）
pub const E_INVALID: u8 = 0x16;

/// `qSupported` への返信
pub const SUPPORTED_FEATURES: &str = "PacketSize=4000;swbreak+;hwbreak+";

/// 1回の `m` で読み取る最大バイト数（16進で送るのでパケット長の半分）
const MAX_MEMORY_READ: usize = 0x2000;

/// コマンド実行の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GdbOutcome {
    /// すぐに返信する
    Reply(Response),
    /// 停止するまで返信を保留する
    Deferred,
    /// 返信せずにセッションを閉じる
    Close,
}

/// 比較用に内容を保持するウォッチポイント
#[derive(Debug, Clone)]
struct Watchpoint {
    kind: PointKind,
    addr: u32,
    len: u32,
    last: Vec<u8>,
}

/// GDBセッションの状態
#[derive(Debug)]
pub(crate) struct GdbSession {
    attached: bool,
    pending: Option<Sender<Response>>,
    last_stop: StopReply,
    watchpoints: Vec<Watchpoint>,
}

impl Default for GdbSession {
    fn default() -> Self {
        Self {
            attached: false,
            pending: None,
            last_stop: StopReply::Signal(5),
            watchpoints: Vec::new(),
        }
    }
}

impl GdbSession {
    /// 停止理由を記録し、保留中の継続要求に返信する
    pub(crate) fn record_stop(&mut self, reply: StopReply) {
        self.last_stop = reply;
        if let Some(pending) = self.pending.take() {
            // 接続が切れていれば返信先はもうない
            let _ = pending.send(Response::Stop(reply));
        }
    }

    pub(crate) fn has_watchpoints(&self) -> bool {
        !self.watchpoints.is_empty()
    }
}

/// エラーをGDBのエラー番号にする
pub fn error_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<TargetError>() {
        Some(TargetError::Alignment(_)) => E_INVALID,
        Some(TargetError::BreakpointNotFound(_)) => E_NOT_FOUND,
        Some(TargetError::OutOfRange { .. }) => E_FAULT,
        _ => E_BAD_ARGS,
    }
}

fn reply_or_error(result: Result<()>) -> GdbOutcome {
    GdbOutcome::Reply(match result {
        Ok(()) => Response::Ok,
        Err(e) => {
            debug!("gdb command failed: {:#}", e);
            Response::Error(error_code(&e))
        }
    })
}

impl<M: Machine> Debugger<M> {
    /// GDBが接続した
    ///
    /// マシンを停止させ、GDBからは停止中のターゲットに見えるようにします。
    pub fn gdb_attach(&mut self) {
        info!("gdb attached");
        self.gdb = GdbSession {
            attached: true,
            ..GdbSession::default()
        };
        self.mark_started();
        self.halt(StopCause::Attached);
    }

    /// GDBが切断した
    ///
    /// ウォッチポイントを捨てて実行を再開します。ブレークポイントは残ります。
    pub fn gdb_detach(&mut self) -> Result<()> {
        if !self.gdb.attached {
            return Ok(());
        }
        info!("gdb detached, resuming");
        self.gdb = GdbSession::default();
        self.resume()
    }

    /// 0x03 による割り込み要求
    pub fn gdb_interrupt(&mut self) {
        if self.is_running() {
            self.halt(StopCause::Interrupted);
        } else {
            debug!("interrupt request while already stopped");
        }
    }

    /// コマンドを実行し、返信を `reply` に送る
    ///
    /// 継続実行の返信は停止したときに送られます。
    pub fn handle_gdb(&mut self, command: GdbCommand, reply: Sender<Response>) {
        let is_continue = matches!(command, GdbCommand::Continue(_));
        if is_continue {
            self.gdb.pending = Some(reply.clone());
        }
        match self.execute_gdb(command) {
            GdbOutcome::Reply(response) => {
                if is_continue {
                    self.gdb.pending = None;
                }
                let _ = reply.send(response);
            }
            GdbOutcome::Deferred => {}
            GdbOutcome::Close => drop(reply),
        }
    }

    /// コマンドを1つ実行する
    pub fn execute_gdb(&mut self, command: GdbCommand) -> GdbOutcome {
        debug!("gdb command {:?}", command);
        match command {
            GdbCommand::HaltReason => GdbOutcome::Reply(Response::Stop(self.gdb.last_stop)),
            GdbCommand::ReadRegisters => {
                let cpu = self.scheduler().snapshot();
                GdbOutcome::Reply(Response::Hex(encode_register_block(&cpu.registers, cpu.mode)))
            }
            GdbCommand::WriteRegisters(data) => {
                let values = decode_register_block(&data);
                self.scheduler().with_machine(|m| {
                    for (index, value) in values.iter().enumerate() {
                        if let Some(value) = value {
                            m.set_register(index, *value);
                        }
                    }
                });
                GdbOutcome::Reply(Response::Ok)
            }
            GdbCommand::ReadRegister(index) => GdbOutcome::Reply(self.read_register(index)),
            GdbCommand::WriteRegister(index, data) => {
                if index < NUM_REGISTERS {
                    let value = decode_register(&data);
                    self.scheduler().with_machine(|m| m.set_register(index, value));
                    GdbOutcome::Reply(Response::Ok)
                } else if index <= CPSR_REGNUM {
                    // 浮動小数点レジスタとモードは書き込めない
                    GdbOutcome::Reply(Response::Ok)
                } else {
                    GdbOutcome::Reply(Response::Error(E_BAD_ARGS))
                }
            }
            GdbCommand::ReadMemory { addr, len } => {
                let response = match self.read_memory(addr, len.min(MAX_MEMORY_READ)) {
                    Ok(bytes) => Response::Hex(bytes),
                    Err(e) => Response::Error(error_code(&e)),
                };
                GdbOutcome::Reply(response)
            }
            GdbCommand::WriteMemory { addr, data } => reply_or_error(self.write_memory(addr, &data)),
            GdbCommand::Continue(addr) => {
                self.set_pc(addr);
                match self.resume() {
                    Ok(()) => GdbOutcome::Deferred,
                    Err(e) => GdbOutcome::Reply(Response::Error(error_code(&e))),
                }
            }
            GdbCommand::Step(addr) => {
                self.set_pc(addr);
                match self.step() {
                    Ok(ExecStatus::Breakpoint) => GdbOutcome::Reply(Response::Stop(StopReply::SoftwareBreak)),
                    Ok(_) => GdbOutcome::Reply(Response::Stop(StopReply::Trap)),
                    Err(e) => GdbOutcome::Reply(Response::Error(error_code(&e))),
                }
            }
            GdbCommand::Detach => GdbOutcome::Reply(Response::Ok),
            GdbCommand::Kill => GdbOutcome::Close,
            GdbCommand::SetThread => GdbOutcome::Reply(Response::Ok),
            GdbCommand::Query(query) => GdbOutcome::Reply(answer_query(&query)),
            GdbCommand::InsertPoint(point) => self.insert_point(point),
            GdbCommand::RemovePoint(point) => self.remove_point(point),
            GdbCommand::Malformed => GdbOutcome::Reply(Response::Error(E_BAD_ARGS)),
            GdbCommand::Unsupported => GdbOutcome::Reply(Response::Empty),
        }
    }

    /// ウォッチポイントの領域が変化していれば最初の1つを返す
    ///
    /// 比較した内容は次回のために保存します。
    pub(crate) fn poll_watchpoints(&mut self) -> Option<(PointKind, u32)> {
        if self.gdb.watchpoints.is_empty() {
            return None;
        }
        let current: Vec<Option<Vec<u8>>> = self
            .gdb
            .watchpoints
            .iter()
            .map(|w| self.read_memory(w.addr, w.len as usize).ok())
            .collect();

        let mut hit = None;
        for (watch, now) in self.gdb.watchpoints.iter_mut().zip(current) {
            let Some(now) = now else { continue };
            if now != watch.last {
                watch.last = now;
                hit = hit.or(Some((watch.kind, watch.addr)));
            }
        }
        hit
    }

    /// ウォッチポイントの比較基準を今のメモリ内容に取り直す
    ///
    /// デバッガ自身の書き込みやリセットを変化として報告しないために使います。
    pub(crate) fn refresh_watchpoints(&mut self) {
        for i in 0..self.gdb.watchpoints.len() {
            let (addr, len) = (self.gdb.watchpoints[i].addr, self.gdb.watchpoints[i].len);
            if let Ok(now) = self.read_memory(addr, len as usize) {
                self.gdb.watchpoints[i].last = now;
            }
        }
    }

    fn read_register(&self, index: usize) -> Response {
        let cpu = self.scheduler().snapshot();
        match index {
            i if i < NUM_REGISTERS => Response::Hex(cpu.registers[i].to_le_bytes().to_vec()),
            i if i < FPS_REGNUM => Response::Hex(vec![0; FP_REGISTER_SIZE]),
            FPS_REGNUM => Response::Hex(vec![0; 4]),
            CPSR_REGNUM => Response::Hex(cpu.mode.to_le_bytes().to_vec()),
            _ => Response::Error(E_BAD_ARGS),
        }
    }

    fn set_pc(&self, addr: Option<u32>) {
        if let Some(addr) = addr {
            self.scheduler().with_machine(|m| m.set_register(PC_REGISTER, addr));
        }
    }

    fn insert_point(&mut self, point: Point) -> GdbOutcome {
        match point.kind {
            PointKind::Software | PointKind::Hardware => {
                reply_or_error(self.set_breakpoint(point.addr).map(|_| ()))
            }
            PointKind::Write | PointKind::Access => {
                if point.len == 0 {
                    return GdbOutcome::Reply(Response::Error(E_BAD_ARGS));
                }
                match self.read_memory(point.addr, point.len as usize) {
                    Ok(last) => {
                        self.gdb
                            .watchpoints
                            .retain(|w| !(w.addr == point.addr && w.kind == point.kind));
                        self.gdb.watchpoints.push(Watchpoint {
                            kind: point.kind,
                            addr: point.addr,
                            len: point.len,
                            last,
                        });
                        GdbOutcome::Reply(Response::Ok)
                    }
                    Err(e) => GdbOutcome::Reply(Response::Error(error_code(&e))),
                }
            }
            PointKind::Read => GdbOutcome::Reply(Response::Empty),
        }
    }

    fn remove_point(&mut self, point: Point) -> GdbOutcome {
        match point.kind {
            PointKind::Software | PointKind::Hardware => reply_or_error(self.unset_breakpoint(point.addr)),
            PointKind::Write | PointKind::Access => {
                self.gdb
                    .watchpoints
                    .retain(|w| !(w.addr == point.addr && w.kind == point.kind));
                GdbOutcome::Reply(Response::Ok)
            }
            PointKind::Read => GdbOutcome::Reply(Response::Empty),
        }
    }
}

fn answer_query(query: &Query) -> Response {
    match query {
        Query::Supported => Response::Text(SUPPORTED_FEATURES.to_string()),
        Query::CurrentThread => Response::Text("QC1".to_string()),
        Query::FirstThreadInfo => Response::Text("m1".to_string()),
        Query::SubsequentThreadInfo => Response::Text("l".to_string()),
        Query::Attached => Response::Text("1".to_string()),
        Query::Unknown(name) => {
            debug!("unsupported query {}", name);
            Response::Empty
        }
    }
}
