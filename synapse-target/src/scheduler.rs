//! マシンスケジューラ
//!
//! 専用の実行スレッドがCPUを所有し、ステップ要求と割り込みを直列化します。
//! CPUとメモリへのアクセスはすべてこのスケジューラを経由します。

use crate::errors::TargetError;
use crate::machine::{ExecStatus, Machine};
use crate::registers::CpuState;
use crate::shutdown::ShutdownToken;
use crate::Result;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 条件変数待ちの上限（シャットダウンへの応答性のためだけに存在する）
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct State<M> {
    machine: M,
    pending: u32,
    status: ExecStatus,
    running: bool,
}

struct Shared<M> {
    state: Mutex<State<M>>,
    cond: Condvar,
    shutdown: ShutdownToken,
    poll: Duration,
}

impl<M> Shared<M> {
    fn lock(&self) -> MutexGuard<'_, State<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State<M>>, timeout: Duration) -> MutexGuard<'a, State<M>> {
        match self.cond.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    fn is_live(&self, state: &State<M>) -> bool {
        state.running && !self.shutdown.is_triggered()
    }
}

/// マシンスケジューラ
pub struct Scheduler<M: Machine> {
    shared: Arc<Shared<M>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Machine> Scheduler<M> {
    /// マシンの所有権を受け取り、実行スレッドを起動する
    pub fn new(machine: M, shutdown: ShutdownToken) -> Result<Self> {
        Self::with_poll_interval(machine, shutdown, DEFAULT_POLL_INTERVAL)
    }

    /// 待機タイムアウトを指定してスケジューラを起動する
    pub fn with_poll_interval(machine: M, shutdown: ShutdownToken, poll: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                machine,
                pending: 0,
                status: ExecStatus::Ok,
                running: true,
            }),
            cond: Condvar::new(),
            shutdown,
            poll,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("machine-scheduler".into())
            .spawn(move || worker_main(worker_shared))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// `cycles` サイクルの実行を要求してすぐに戻る
    pub fn step(&self, cycles: u32) {
        let mut state = self.shared.lock();
        state.pending = cycles;
        self.shared.cond.notify_all();
    }

    /// `cycles` サイクルを実行し、完了するまで待機する
    ///
    /// カウンタが0に戻り、かつ割り込み待ちでなくなるまでブロックします。
    /// 待機中にスケジューラが停止した場合は `SchedulerTerminated` を返します。
    pub fn step_and_wait(&self, cycles: u32) -> Result<ExecStatus> {
        if cycles == 0 {
            let state = self.shared.lock();
            if !self.shared.is_live(&state) {
                return Err(TargetError::SchedulerTerminated.into());
            }
            return Ok(state.status);
        }

        self.step(cycles);
        let mut state = self.shared.lock();
        loop {
            if !self.shared.is_live(&state) {
                return Err(TargetError::SchedulerTerminated.into());
            }
            if state.pending == 0 && state.status != ExecStatus::WaitingForInterrupt {
                return Ok(state.status);
            }
            state = self.shared.wait(state, self.shared.poll);
        }
    }

    /// 実行中のステップが終わるまで最大 `timeout` 待つ
    ///
    /// カウンタが0であれば直近のステータスを返し、時間切れなら `None` を返します。
    pub fn poll_idle(&self, timeout: Duration) -> Result<Option<ExecStatus>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if !self.shared.is_live(&state) {
                return Err(TargetError::SchedulerTerminated.into());
            }
            if state.pending == 0 {
                return Ok(Some(state.status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = (deadline - now).min(self.shared.poll);
            state = self.shared.wait(state, wait);
        }
    }

    /// CPUの割り込み線をアサートする
    ///
    /// カウンタが0なら1ステップを追加し、割り込みが取り残されないようにします。
    pub fn interrupt(&self, device_id: u32, code: u32) {
        let mut state = self.shared.lock();
        debug!("interrupt from device 0x{:08x} with code {}", device_id, code);
        state.machine.interrupt(device_id, code);
        if state.pending == 0 {
            state.pending = 1;
        }
        self.shared.cond.notify_all();
    }

    /// まだ実行されていないステップ要求を取り消す
    ///
    /// 実行スレッドがステップ中であれば、それが終わるまで待ってから戻ります。
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        state.pending = 0;
        self.shared.cond.notify_all();
    }

    /// ロックを保持したままマシンを操作する
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        let mut state = self.shared.lock();
        f(&mut state.machine)
    }

    /// レジスタ状態のスナップショットを取得する
    pub fn snapshot(&self) -> CpuState {
        self.with_machine(|m| m.snapshot())
    }

    /// プログラムカウンタを取得する
    pub fn pc(&self) -> u32 {
        self.with_machine(|m| m.pc())
    }

    /// 直近の実行ステータス
    pub fn status(&self) -> ExecStatus {
        self.shared.lock().status
    }

    /// 未実行のステップが残っているか
    pub fn is_stepping(&self) -> bool {
        self.shared.lock().pending != 0
    }

    /// マシンのメモリイメージを作り直す
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        state.machine.reset();
        state.pending = 0;
        state.status = ExecStatus::Ok;
        self.shared.cond.notify_all();
    }

    /// 実行スレッドを停止して合流する
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            self.shared.cond.notify_all();
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            info!("joining machine scheduler");
            let _ = handle.join();
        }
    }
}

impl<M: Machine> Drop for Scheduler<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main<M: Machine>(shared: Arc<Shared<M>>) {
    let mut state = shared.lock();
    loop {
        if !shared.is_live(&state) {
            break;
        }

        let blocked = state.pending == 0
            || (state.status == ExecStatus::WaitingForInterrupt && !state.machine.interrupt_pending());
        if blocked {
            state = shared.wait(state, shared.poll);
            continue;
        }

        let cycles = state.pending;
        state.status = state.machine.step(cycles);
        state.pending = 0;
        shared.cond.notify_all();
    }
    // 待機中の呼び出し元に終了を知らせる
    shared.cond.notify_all();
}
