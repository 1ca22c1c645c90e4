//! デバッガのメインロジック
//!
//! セッションの状態（停止中/実行中）を管理し、受け取ったコマンドを
//! スケジューラやブレークポイントテーブルへの操作に変換します。
//! 停止するたびにレジスタ状態とメモリウォッチの内容をピアへ送ります。

use crate::config::DebuggerConfig;
use crate::disasm::{is_branch_with_link, CapstoneDisassembler, Disassembler};
use crate::gdb::GdbSession;
use crate::outbound::Outbound;
use crate::symbols::SymbolTable;
use crate::tapes::{InvalidationSignal, TapeCatalog};
use crate::watch::WatchRegistry;
use crate::Result;
use std::sync::Arc;
use synapse_proto::{
    DisassemblyData, Handshake, MachineState, MemData, MemView, Message, PointKind, StopReply, TapeList,
    TapeRequest,
};
use synapse_target::{BreakpointTable, CpuState, ExecStatus, Machine, Scheduler};
use tracing::{debug, info, warn};

/// セッションの実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// 入力を待っている
    #[default]
    Stopped,
    /// スライス単位で実行を続けている
    Running,
}

/// 停止の理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// ピアが明示的に停止を要求した（ピアには通知しない）
    Requested,
    /// トラップ命令に到達した
    Breakpoint,
    /// ウォッチポイントの領域が変化した
    Watchpoint { kind: PointKind, addr: u32 },
    /// GDBの割り込み要求
    Interrupted,
    /// GDBが接続した
    Attached,
}

impl StopCause {
    fn stop_reply(self) -> StopReply {
        match self {
            StopCause::Breakpoint => StopReply::SoftwareBreak,
            StopCause::Watchpoint { kind, addr } => StopReply::Watch { kind, addr },
            StopCause::Requested | StopCause::Interrupted => StopReply::Interrupted,
            StopCause::Attached => StopReply::Signal(5),
        }
    }

    fn notifies_peer(self) -> bool {
        self != StopCause::Requested
    }
}

/// CPU状態をワイヤ形式にする
pub fn machine_state(cpu: &CpuState) -> MachineState {
    MachineState {
        registers: cpu.registers,
        mode: cpu.mode,
        pc: cpu.pc,
        waiting: cpu.waiting,
    }
}

/// デバッガ
pub struct Debugger<M: Machine> {
    /// CPUへの唯一の入り口
    scheduler: Arc<Scheduler<M>>,
    /// ブレークポイント管理
    breakpoints: BreakpointTable,
    /// `next` が仕掛けた一時ブレークポイント
    next_breakpoint: Option<u32>,
    /// メモリウォッチ
    watches: WatchRegistry,
    /// シンボルテーブル
    symbols: SymbolTable,
    /// テープカタログ
    tapes: TapeCatalog,
    /// シンボル再読み込みの要求
    invalidation: InvalidationSignal,
    disassembler: Box<dyn Disassembler>,
    outbound: Arc<dyn Outbound>,
    state: RunState,
    /// 一度でも実行を始めたか
    started: bool,
    /// スケジューラに要求したスライスがまだ終わっていない
    slice_in_flight: bool,
    pub(crate) gdb: GdbSession,
    config: DebuggerConfig,
}

impl<M: Machine> Debugger<M> {
    /// 新しいデバッガを作成する
    ///
    /// 停止状態で始まり、シンボルテーブルをすぐに読み込みます。
    pub fn new(scheduler: Arc<Scheduler<M>>, config: DebuggerConfig, outbound: Arc<dyn Outbound>) -> Self {
        let mut debugger = Self {
            scheduler,
            breakpoints: BreakpointTable::new(),
            next_breakpoint: None,
            watches: WatchRegistry::new(),
            symbols: SymbolTable::new(),
            tapes: TapeCatalog::default(),
            invalidation: InvalidationSignal::new(),
            disassembler: Box::new(CapstoneDisassembler::new()),
            outbound,
            state: RunState::Stopped,
            started: false,
            slice_in_flight: false,
            gdb: GdbSession::default(),
            config,
        };
        if let Err(e) = debugger.reload_symbols() {
            warn!("failed to load symbols: {:#}", e);
        }
        debugger
    }

    /// テープカタログを設定する
    pub fn with_tapes(mut self, tapes: TapeCatalog) -> Self {
        self.tapes = tapes;
        self
    }

    /// 逆アセンブラを差し替える
    pub fn with_disassembler(mut self, disassembler: Box<dyn Disassembler>) -> Self {
        self.disassembler = disassembler;
        self
    }

    pub fn scheduler(&self) -> &Arc<Scheduler<M>> {
        &self.scheduler
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn tapes(&self) -> &TapeCatalog {
        &self.tapes
    }

    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// デバイスに渡すシンボル無効化の通知口
    pub fn invalidation_signal(&self) -> InvalidationSignal {
        self.invalidation.clone()
    }

    /// プライベートプロトコルのコマンドを処理する
    ///
    /// 応答の種類のメッセージや空でないシンボルデータは無視します。
    pub fn handle_message(&mut self, message: Message) -> Result<()> {
        debug!("handling {:?}", message.message_type());
        match message {
            Message::Connect(handshake) => self.connect(&handshake),
            Message::Disconnect => {
                info!("peer sent disconnect");
                Ok(())
            }
            Message::Stop => {
                self.halt(StopCause::Requested);
                Ok(())
            }
            Message::Resume => self.resume(),
            Message::Step => self.step().map(|_| ()),
            Message::Next => self.next(),
            Message::Restart => self.restart(),
            Message::SetBreakpoint(addr) => self.set_breakpoint(addr).map(|_| ()),
            Message::UnsetBreakpoint(addr) => self.unset_breakpoint(addr),
            Message::MemWatch(view) => self.watch(view),
            Message::Unwatch(id) => self.unwatch(id),
            Message::Disassembly(view) => {
                let data = self.disassembly(&view)?;
                self.send(Message::DisassemblyData(data));
                Ok(())
            }
            Message::TapeRequest(request) => {
                let list = self.tape_list(&request);
                self.send(Message::TapeList(list));
                Ok(())
            }
            Message::TapeLoad(index) => self.load_tape(index),
            Message::TapeUnload => {
                self.unload_tape();
                Ok(())
            }
            Message::SymbolData(symbols) if symbols.is_empty() => {
                self.send_symbols();
                Ok(())
            }
            other => {
                debug!("ignoring {:?} from peer", other.message_type());
                Ok(())
            }
        }
    }

    /// ハンドシェイクを受け取ったら状態を一式送る
    ///
    /// まだ一度も実行していなければここで実行を始めます。
    pub fn connect(&mut self, handshake: &Handshake) -> Result<()> {
        info!("peer connected (replies to {}:{})", handshake.host, handshake.port);
        self.push_update();
        if !self.started && self.state == RunState::Stopped {
            self.resume()?;
        }
        Ok(())
    }

    /// 実行を再開する
    ///
    /// pcがブレークポイント上ならその命令を先に1つ実行します。
    /// 実際の実行は `advance` がスライス単位で進めます。
    pub fn resume(&mut self) -> Result<()> {
        if self.state == RunState::Running {
            return Ok(());
        }
        self.started = true;
        if let Some(status) = self.breakpoints.step_over_if_needed(&self.scheduler)? {
            debug!("stepped over breakpoint before resuming ({:?})", status);
        }
        self.state = RunState::Running;
        debug!("resumed at 0x{:08x}", self.scheduler.pc());
        Ok(())
    }

    /// 実行中のスライスを1つ進める
    ///
    /// スライスの完了を最大でポーリング間隔だけ待ちます。トラップ命令や
    /// ウォッチポイントの変化を見つけたら停止します。
    pub fn advance(&mut self) -> Result<()> {
        if self.state != RunState::Running {
            return Ok(());
        }
        if !self.slice_in_flight {
            self.scheduler.step(self.slice_cycles());
            self.slice_in_flight = true;
        }

        let Some(status) = self.scheduler.poll_idle(self.config.poll_interval)? else {
            return Ok(());
        };
        self.slice_in_flight = false;

        if status == ExecStatus::Breakpoint {
            info!("breakpoint hit at 0x{:08x}", self.scheduler.pc());
            self.halt(StopCause::Breakpoint);
        } else if let Some((kind, addr)) = self.poll_watchpoints() {
            info!("watchpoint at 0x{:08x} triggered", addr);
            self.halt(StopCause::Watchpoint { kind, addr });
        }
        Ok(())
    }

    fn slice_cycles(&self) -> u32 {
        // ウォッチポイントがある間は1命令ずつ比較する
        if self.gdb.has_watchpoints() {
            1
        } else {
            self.config.frame_cycles
        }
    }

    /// 停止する
    ///
    /// 一時ブレークポイントを外し、GDBの待機中の継続要求に応答し、
    /// 必要ならピアにSTOPを通知してから状態を送ります。
    pub fn halt(&mut self, cause: StopCause) {
        let was_running = self.state == RunState::Running;
        self.settle();
        self.clear_next_breakpoint();
        debug!("halted at 0x{:08x} ({:?})", self.scheduler.pc(), cause);

        self.gdb.record_stop(cause.stop_reply());
        if was_running && cause.notifies_peer() {
            self.send(Message::Stop);
        }
        self.after_stop();
    }

    /// 命令を1つ実行する
    ///
    /// 割り込み待ちの状態では、割り込みが届くまで戻りません。
    pub fn step(&mut self) -> Result<ExecStatus> {
        self.settle();
        self.clear_next_breakpoint();
        self.started = true;

        let status = match self.breakpoints.step_over_if_needed(&self.scheduler)? {
            Some(status) => status,
            None => self.scheduler.step_and_wait(1)?,
        };
        debug!("stepped to 0x{:08x} ({:?})", self.scheduler.pc(), status);

        let reply = if status == ExecStatus::Breakpoint {
            StopReply::SoftwareBreak
        } else {
            StopReply::Trap
        };
        self.gdb.record_stop(reply);
        self.after_stop();
        Ok(status)
    }

    /// 関数呼び出しをまたいで次の命令まで進む
    ///
    /// pcの命令がリンク付き分岐なら、戻り先に一時ブレークポイントを置いて
    /// 実行を再開します。そうでなければ `step` と同じです。
    pub fn next(&mut self) -> Result<()> {
        self.settle();
        let pc = self.scheduler.pc();
        let word = match self.breakpoints.original(pc) {
            Some(word) => word,
            None => self.scheduler.with_machine(|m| m.read_word(pc))?,
        };
        if !is_branch_with_link(word) {
            return self.step().map(|_| ());
        }

        let ret = pc.wrapping_add(4);
        if !self.breakpoints.contains(ret) {
            self.breakpoints.add(ret, &self.scheduler)?;
            self.next_breakpoint = Some(ret);
            debug!("temporary breakpoint at 0x{:08x}", ret);
        }
        self.resume()
    }

    /// マシンの電源を入れ直す
    ///
    /// ブレークポイントは保存済みの元ワードのまま新しいイメージに書き直し、
    /// 次の停止でシンボルを読み直します。
    pub fn restart(&mut self) -> Result<()> {
        let was_running = self.state == RunState::Running;
        self.settle();
        self.clear_next_breakpoint();

        self.scheduler.reset();
        self.breakpoints.reapply_all(&self.scheduler)?;
        self.refresh_watchpoints();
        self.invalidation.raise();
        info!("machine restarted");

        self.after_stop();
        if was_running {
            self.resume()?;
        }
        Ok(())
    }

    /// ブレークポイントを設定する
    pub fn set_breakpoint(&mut self, addr: u32) -> Result<bool> {
        if self.next_breakpoint == Some(addr) {
            // 一時ブレークポイントをそのまま利用者のものにする
            self.next_breakpoint = None;
            return Ok(true);
        }
        let added = self.breakpoints.add(addr, &self.scheduler)?;
        if added {
            info!("breakpoint set at 0x{:08x}", addr);
        }
        Ok(added)
    }

    /// ブレークポイントを解除する
    pub fn unset_breakpoint(&mut self, addr: u32) -> Result<()> {
        self.breakpoints.remove(addr, &self.scheduler)?;
        if self.next_breakpoint == Some(addr) {
            self.next_breakpoint = None;
        }
        info!("breakpoint removed at 0x{:08x}", addr);
        Ok(())
    }

    /// メモリウォッチを登録する
    ///
    /// サイズが0でなければ `start` からの内容をすぐに1回送ります。
    pub fn watch(&mut self, view: MemView) -> Result<()> {
        let snapshot = if view.size != 0 {
            Some(self.read_memory(view.start, view.size as usize)?)
        } else {
            None
        };
        self.watches.insert(view);
        if let Some(data) = snapshot {
            self.send(Message::MemData(MemData {
                id: view.id,
                start: view.start,
                data,
            }));
        }
        Ok(())
    }

    /// メモリウォッチを解除する
    pub fn unwatch(&mut self, id: u32) -> Result<()> {
        self.watches.remove(id).map(|_| ())
    }

    /// 範囲を逆アセンブルする
    ///
    /// ブレークポイントの位置には元の命令を表示します。
    pub fn disassembly(&self, view: &MemView) -> Result<DisassemblyData> {
        let len = (view.size & !3) as usize;
        let memory = self.read_memory(view.start, len)?;
        let words: Vec<u32> = memory
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let lines = self.disassembler.disassemble(view.start, &words, &self.symbols)?;
        if lines.len() != words.len() {
            anyhow::bail!(
                "Disassembler returned {} lines for {} words",
                lines.len(),
                words.len()
            );
        }
        Ok(DisassemblyData {
            start: view.start,
            memory,
            lines,
        })
    }

    /// テープを挿入する
    pub fn load_tape(&mut self, index: u32) -> Result<()> {
        let name = self.tapes.load(index)?;
        info!("tape {} ({}) loaded", index, name);
        Ok(())
    }

    /// テープを取り出す
    ///
    /// 取り出しは常にシンボルテーブルを無効にする可能性があります。
    pub fn unload_tape(&mut self) {
        if let Some(index) = self.tapes.unload() {
            info!("tape {} unloaded", index);
        }
        self.invalidation.raise();
    }

    /// テープ名の一覧の一部を返す
    pub fn tape_list(&self, request: &TapeRequest) -> TapeList {
        TapeList {
            id: request.id,
            start: request.start,
            total: self.tapes.len() as u32,
            names: self.tapes.window(request.start, request.size).to_vec(),
        }
    }

    /// シンボルテーブルをピアへ送る
    pub fn send_symbols(&self) {
        self.send(Message::SymbolData(self.symbols.to_pairs()));
    }

    /// メモリを読み取る（トラップ命令は元の命令に置き換えて見せる）
    pub fn read_memory(&self, addr: u32, len: usize) -> Result<Vec<u8>> {
        let mut bytes = self.scheduler.with_machine(|m| m.read_memory(addr, len))?;
        self.breakpoints.overlay(addr, &mut bytes);
        Ok(bytes)
    }

    /// メモリに書き込む（ブレークポイントは残る）
    pub fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.breakpoints.write_through(addr, data, &self.scheduler)?;
        self.refresh_watchpoints();
        Ok(())
    }

    /// レジスタ状態とすべてのメモリウォッチの内容を送る
    pub fn push_update(&self) {
        if !self.outbound.is_connected() {
            return;
        }
        self.send(Message::State(machine_state(&self.scheduler.snapshot())));
        for view in self.watches.iter() {
            match self.read_memory(view.watch_start, view.watch_size as usize) {
                Ok(data) => self.send(Message::MemData(MemData {
                    id: view.id,
                    start: view.watch_start,
                    data,
                })),
                Err(e) => warn!("memory watch {} unreadable: {:#}", view.id, e),
            }
        }
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    fn send(&self, message: Message) {
        self.outbound.send(&message);
    }

    fn reload_symbols(&mut self) -> Result<()> {
        let (addr, max, len) = (
            self.config.symbols_addr,
            self.config.max_symbols,
            self.config.max_symbol_len,
        );
        self.symbols = self
            .scheduler
            .with_machine(|m| SymbolTable::scan(&*m, addr, max, len))?;
        Ok(())
    }

    /// 実行中のスライスを取り消して停止状態にする
    fn settle(&mut self) {
        if self.slice_in_flight || self.state == RunState::Running {
            self.scheduler.cancel();
        }
        self.slice_in_flight = false;
        self.state = RunState::Stopped;
    }

    fn clear_next_breakpoint(&mut self) {
        if let Some(addr) = self.next_breakpoint.take() {
            if let Err(e) = self.breakpoints.remove(addr, &self.scheduler) {
                warn!("failed to clear temporary breakpoint at 0x{:08x}: {:#}", addr, e);
            }
        }
    }

    fn after_stop(&mut self) {
        if self.invalidation.take() {
            match self.reload_symbols() {
                Ok(()) => self.send_symbols(),
                Err(e) => warn!("failed to reload symbols: {:#}", e),
            }
        }
        self.push_update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Recorder;
    use std::time::Duration;
    use synapse_target::{RamMachine, ShutdownToken, TRAP_OPCODE};

    const BL: u32 = 0xeb00_0010;

    fn debugger_with(machine: RamMachine) -> (Debugger<RamMachine>, Arc<Recorder>) {
        let scheduler = Arc::new(
            Scheduler::with_poll_interval(machine, ShutdownToken::new(), Duration::from_millis(10)).unwrap(),
        );
        let recorder = Arc::new(Recorder::new());
        let config = DebuggerConfig {
            frame_cycles: 16,
            symbols_addr: 0x800,
            poll_interval: Duration::from_millis(50),
            ..DebuggerConfig::default()
        };
        let debugger = Debugger::new(scheduler, config, recorder.clone());
        (debugger, recorder)
    }

    fn run_until_stopped(debugger: &mut Debugger<RamMachine>) {
        for _ in 0..200 {
            if !debugger.is_running() {
                return;
            }
            debugger.advance().unwrap();
        }
        panic!("machine never stopped");
    }

    fn states(messages: &[Message]) -> Vec<MachineState> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_starts_stopped_until_connect() {
        let (mut dbg, rec) = debugger_with(RamMachine::new(0x1000));
        assert_eq!(dbg.state(), RunState::Stopped);

        dbg.handle_message(Message::Connect(Handshake {
            host: "127.0.0.1".into(),
            port: 4000,
        }))
        .unwrap();
        assert_eq!(dbg.state(), RunState::Running);
        assert_eq!(states(&rec.take()).len(), 1);
    }

    #[test]
    fn test_resume_until_breakpoint_notifies() {
        let (mut dbg, rec) = debugger_with(RamMachine::new(0x1000));
        dbg.set_breakpoint(0x20).unwrap();
        dbg.resume().unwrap();
        run_until_stopped(&mut dbg);

        assert_eq!(dbg.scheduler().pc(), 0x20);
        let sent = rec.take();
        assert_eq!(sent[0], Message::Stop);
        assert_eq!(states(&sent)[0].pc, 0x20);

        // 再開時はトラップを踏み直さない
        dbg.resume().unwrap();
        assert_eq!(dbg.scheduler().pc(), 0x24);
        dbg.handle_message(Message::Stop).unwrap();
        assert!(!dbg.is_running());
        // 明示的な停止ではSTOPを送らない
        assert!(!rec.take().contains(&Message::Stop));
        assert_eq!(
            dbg.scheduler().with_machine(|m| m.read_word(0x20).unwrap()),
            TRAP_OPCODE
        );
    }

    #[test]
    fn test_step_honours_breakpoint() {
        let (mut dbg, rec) = debugger_with(RamMachine::new(0x1000));
        dbg.set_breakpoint(0x0).unwrap();
        assert_eq!(dbg.step().unwrap(), ExecStatus::Ok);
        assert_eq!(dbg.scheduler().pc(), 4);

        dbg.set_breakpoint(0x8).unwrap();
        dbg.step().unwrap();
        assert_eq!(dbg.scheduler().pc(), 8);
        assert_eq!(dbg.step().unwrap(), ExecStatus::Ok);
        assert_eq!(dbg.scheduler().pc(), 12);
        assert_eq!(
            dbg.scheduler().with_machine(|m| m.read_word(8).unwrap()),
            TRAP_OPCODE
        );
        assert_eq!(states(&rec.take()).len(), 3);
    }

    #[test]
    fn test_next_over_call_uses_temporary_breakpoint() {
        let mut machine = RamMachine::new(0x1000);
        machine.write_word(0x10, BL).unwrap();
        let (mut dbg, _rec) = debugger_with(machine);

        // BL以外はステップと同じ
        dbg.next().unwrap();
        assert_eq!(dbg.scheduler().pc(), 4);

        dbg.scheduler().with_machine(|m| m.set_register(15, 0x10));
        dbg.next().unwrap();
        assert!(dbg.is_running());
        assert!(dbg.breakpoints().contains(0x14));
        run_until_stopped(&mut dbg);

        assert_eq!(dbg.scheduler().pc(), 0x14);
        assert!(!dbg.breakpoints().contains(0x14));
        assert_eq!(dbg.scheduler().with_machine(|m| m.read_word(0x14).unwrap()), 0);
    }

    #[test]
    fn test_watch_and_update() {
        let mut machine = RamMachine::new(0x1000);
        machine.write_memory(0x100, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let (mut dbg, rec) = debugger_with(machine);

        dbg.handle_message(Message::MemWatch(MemView {
            id: 7,
            start: 0x100,
            size: 8,
            watch_start: 0x104,
            watch_size: 2,
        }))
        .unwrap();
        assert_eq!(
            rec.take(),
            vec![Message::MemData(MemData {
                id: 7,
                start: 0x100,
                data: vec![1, 2, 3, 4, 5, 6, 7, 8]
            })]
        );

        dbg.step().unwrap();
        let sent = rec.take();
        assert_eq!(
            sent[1],
            Message::MemData(MemData {
                id: 7,
                start: 0x104,
                data: vec![5, 6]
            })
        );

        dbg.unwatch(7).unwrap();
        assert!(dbg.unwatch(7).is_err());
    }

    #[test]
    fn test_restart_reapplies_breakpoints() {
        let mut image = vec![0u8; 0x40];
        image[0x20..0x24].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        let (mut dbg, _rec) = debugger_with(RamMachine::with_image(0x1000, &image));

        dbg.set_breakpoint(0x20).unwrap();
        dbg.write_memory(0x20, &[0xaa, 0xbb, 0xcc, 0xdd]).unwrap();
        dbg.step().unwrap();
        dbg.restart().unwrap();

        assert_eq!(dbg.scheduler().pc(), 0);
        assert_eq!(
            dbg.scheduler().with_machine(|m| m.read_word(0x20).unwrap()),
            TRAP_OPCODE
        );
        // 元ワードは読み直さずに保存済みのものを使う
        assert_eq!(dbg.breakpoints().original(0x20), Some(0xddcc_bbaa));
    }

    #[test]
    fn test_unload_tape_reloads_symbols_on_stop() {
        let (mut dbg, rec) = debugger_with(RamMachine::new(0x1000));
        dbg.tapes = TapeCatalog::new(vec!["boot".into()]);
        assert!(dbg.symbols().is_empty());

        let mut raw = 0x100u32.to_be_bytes().to_vec();
        raw.extend_from_slice(b"main\0");
        dbg.write_memory(0x800, &raw).unwrap();

        dbg.handle_message(Message::TapeLoad(0)).unwrap();
        assert!(dbg.handle_message(Message::TapeLoad(4)).is_err());
        dbg.handle_message(Message::TapeUnload).unwrap();
        assert!(dbg.symbols().is_empty());

        dbg.step().unwrap();
        assert_eq!(dbg.symbols().lookup(0x104), (Some("main"), 4));
        assert!(rec
            .take()
            .contains(&Message::SymbolData(vec![(0x100, "main".to_string())])));
    }

    #[test]
    fn test_tape_list_window() {
        let (dbg, _rec) = debugger_with(RamMachine::new(0x100));
        let dbg = dbg.with_tapes(TapeCatalog::new(vec!["a".into(), "b".into(), "c".into()]));
        let list = dbg.tape_list(&TapeRequest { id: 3, start: 1, size: 10 });
        assert_eq!(list.total, 3);
        assert_eq!(list.names, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_disassembly_shows_original_words() {
        let mut machine = RamMachine::new(0x100);
        machine.write_word(0x10, 0xe3a0_0001).unwrap();
        let (mut dbg, _rec) = debugger_with(machine);
        dbg.set_breakpoint(0x10).unwrap();

        let data = dbg
            .disassembly(&MemView {
                id: 0,
                start: 0x10,
                size: 10,
                watch_start: 0,
                watch_size: 0,
            })
            .unwrap();
        assert_eq!(data.memory.len(), 8);
        assert_eq!(&data.memory[..4], &0xe3a0_0001u32.to_le_bytes());
        assert_eq!(data.lines.len(), 2);
        assert!(data.lines[0].contains("mov"));
    }
}
