//! サーバー側の組み立て
//!
//! マシンスケジューラ、デバッガのループ、2つのリスナーを起動し、
//! まとめて停止できるようにします。

use crate::config::NetConfig;
use crate::listener::{self, spawn_accept_loop};
use crate::private::serve_private;
use crate::rsp::serve_gdb;
use crate::uplink::Uplink;
use crate::Result;
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use synapse_core::{Debugger, DebuggerConfig, DebuggerLoop, Event, InvalidationSignal, TapeCatalog};
use synapse_target::{Machine, Scheduler, ShutdownToken};
use tracing::info;

/// ハーネスの設定
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// プライベートプロトコルの待ち受けアドレス
    pub private_addr: String,
    /// GDBの待ち受けアドレス（`None` なら待ち受けない）
    pub gdb_addr: Option<String>,
    pub debugger: DebuggerConfig,
    pub net: NetConfig,
    /// テープカタログの名前
    pub tapes: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            private_addr: "127.0.0.1:0".to_string(),
            gdb_addr: None,
            debugger: DebuggerConfig::default(),
            net: NetConfig::default(),
            tapes: Vec::new(),
        }
    }
}

/// 実行中のハーネス
pub struct Harness<M: Machine> {
    scheduler: Arc<Scheduler<M>>,
    shutdown: ShutdownToken,
    invalidation: InvalidationSignal,
    private_addr: SocketAddr,
    gdb_addr: Option<SocketAddr>,
    threads: Vec<JoinHandle<()>>,
}

impl<M: Machine> Harness<M> {
    /// マシンを受け取り、すべてのスレッドを起動する
    pub fn start(machine: M, config: HarnessConfig) -> Result<Self> {
        config.debugger.validate()?;
        let poll = config.net.poll_interval;
        let shutdown = ShutdownToken::new();

        // スレッドを起動する前にバインドしておく
        let private_listener = listener::bind(&config.private_addr)?;
        let private_addr = private_listener.local_addr()?;
        let gdb_listener = config.gdb_addr.as_deref().map(listener::bind).transpose()?;
        let gdb_addr = gdb_listener.as_ref().map(TcpListener::local_addr).transpose()?;

        let scheduler = Arc::new(Scheduler::with_poll_interval(machine, shutdown.clone(), poll)?);
        let uplink = Arc::new(Uplink::new(config.net.write_timeout));
        let debugger = Debugger::new(Arc::clone(&scheduler), config.debugger.clone(), uplink.clone())
            .with_tapes(TapeCatalog::new(config.tapes.clone()));
        let invalidation = debugger.invalidation_signal();

        let (events, rx) = mpsc::channel();
        let mut threads = Vec::new();
        let spawned = DebuggerLoop::new(debugger, rx, shutdown.clone())
            .spawn()
            .and_then(|handle| {
                threads.push(handle);
                spawn_listeners(&mut threads, private_listener, gdb_listener, &events, &uplink, &shutdown, poll)
            });

        let mut harness = Self {
            scheduler,
            shutdown,
            invalidation,
            private_addr,
            gdb_addr,
            threads,
        };
        if let Err(e) = spawned {
            harness.shutdown();
            return Err(e);
        }
        info!("harness started (private {}, gdb {:?})", private_addr, gdb_addr);
        Ok(harness)
    }

    /// マシンスケジューラ（デバイスの割り込み用）
    pub fn scheduler(&self) -> &Arc<Scheduler<M>> {
        &self.scheduler
    }

    /// シンボル無効化の通知口
    pub fn invalidation_signal(&self) -> InvalidationSignal {
        self.invalidation.clone()
    }

    /// シャットダウン用のトークン
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    pub fn private_addr(&self) -> SocketAddr {
        self.private_addr
    }

    pub fn gdb_addr(&self) -> Option<SocketAddr> {
        self.gdb_addr
    }

    /// すべてのスレッドが終わるまで待つ
    ///
    /// 別のスレッドがトークンでシャットダウンするまで戻りません。
    pub fn wait(&mut self) {
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.scheduler.shutdown();
    }

    /// すべてのスレッドを止めて合流する
    pub fn shutdown(&mut self) {
        if !self.shutdown.is_triggered() {
            info!("shutting down harness");
        }
        self.shutdown.trigger();
        self.wait();
    }
}

impl<M: Machine> Drop for Harness<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_listeners(
    threads: &mut Vec<JoinHandle<()>>,
    private_listener: TcpListener,
    gdb_listener: Option<TcpListener>,
    events: &Sender<Event>,
    uplink: &Arc<Uplink>,
    shutdown: &ShutdownToken,
    poll: std::time::Duration,
) -> Result<()> {
    {
        let events = events.clone();
        let uplink = Arc::clone(uplink);
        let token = shutdown.clone();
        threads.push(spawn_accept_loop(
            "private",
            private_listener,
            shutdown.clone(),
            poll,
            move |stream, _| serve_private(stream, &events, &uplink, &token),
        )?);
    }
    if let Some(listener) = gdb_listener {
        let events = events.clone();
        let token = shutdown.clone();
        threads.push(spawn_accept_loop(
            "gdb",
            listener,
            shutdown.clone(),
            poll,
            move |stream, _| serve_gdb(stream, &events, &token, poll),
        )?);
    }
    Ok(())
}
