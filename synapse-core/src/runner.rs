//! デバッガの実行ループ
//!
//! 接続層から届くイベントを1本のスレッドで順番に処理し、実行中は
//! イベントの合間にスライスを進めます。

use crate::debugger::Debugger;
use crate::Result;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use synapse_proto::{GdbCommand, Message, Response};
use synapse_target::{Machine, ShutdownToken, TargetError};
use tracing::{info, warn};

/// 接続層からデバッガへのイベント
#[derive(Debug)]
pub enum Event {
    /// プライベートプロトコルのメッセージ
    Message(Message),
    /// プライベートプロトコルのピアとの接続が切れた
    PeerLost,
    /// GDBが接続した
    GdbAttached,
    /// GDBのコマンドと返信先
    Gdb {
        command: GdbCommand,
        reply: Sender<Response>,
    },
    /// GDBの割り込み要求（0x03）
    GdbInterrupt,
    /// GDBとの接続が終わった
    GdbDetached,
}

impl<M: Machine> Debugger<M> {
    /// イベントを1つ処理する
    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Message(message) => self.handle_message(message),
            Event::PeerLost => {
                info!("peer connection lost");
                Ok(())
            }
            Event::GdbAttached => {
                self.gdb_attach();
                Ok(())
            }
            Event::Gdb { command, reply } => {
                self.handle_gdb(command, reply);
                Ok(())
            }
            Event::GdbInterrupt => {
                self.gdb_interrupt();
                Ok(())
            }
            Event::GdbDetached => self.gdb_detach(),
        }
    }
}

/// スケジューラが止まったことによるエラーか
pub fn is_terminated(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TargetError>(),
        Some(TargetError::SchedulerTerminated)
    )
}

/// デバッガを所有してイベントを処理するループ
pub struct DebuggerLoop<M: Machine> {
    debugger: Debugger<M>,
    events: Receiver<Event>,
    shutdown: ShutdownToken,
}

impl<M: Machine> DebuggerLoop<M> {
    pub fn new(debugger: Debugger<M>, events: Receiver<Event>, shutdown: ShutdownToken) -> Self {
        Self {
            debugger,
            events,
            shutdown,
        }
    }

    /// 専用スレッドでループを動かす
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("debugger".into())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// シャットダウンされるか、イベントの送り手がいなくなるまで処理を続ける
    pub fn run(mut self) {
        info!("debugger loop started");
        while !self.shutdown.is_triggered() {
            let outcome = if self.debugger.is_running() {
                self.run_slice()
            } else {
                self.wait_for_event()
            };
            match outcome {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if is_terminated(&e) => break,
                Err(e) => warn!("debugger error: {:#}", e),
            }
        }
        info!("debugger loop stopped");
    }

    fn wait_for_event(&mut self) -> Result<bool> {
        match self.events.recv_timeout(self.debugger.config().poll_interval) {
            Ok(event) => {
                self.dispatch(event)?;
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(true),
            Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }

    fn run_slice(&mut self) -> Result<bool> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.dispatch(event)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(false),
            }
        }
        self.debugger.advance()?;
        Ok(true)
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        if let Err(e) = self.debugger.handle_event(event) {
            if is_terminated(&e) {
                return Err(e);
            }
            // コマンドの失敗はセッションを止めない
            warn!("command failed: {:#}", e);
        }
        Ok(())
    }
}
