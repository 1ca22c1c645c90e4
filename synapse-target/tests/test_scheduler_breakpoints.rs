//! スケジューラとブレークポイントテーブルを組み合わせたテスト

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use synapse_target::ram::WAIT_OPCODE;
use synapse_target::{BreakpointTable, ExecStatus, Machine, RamMachine, Scheduler, ShutdownToken, TRAP_OPCODE};

fn scheduler(machine: RamMachine, token: ShutdownToken) -> Arc<Scheduler<RamMachine>> {
    Arc::new(Scheduler::with_poll_interval(machine, token, Duration::from_millis(10)).unwrap())
}

#[test]
fn test_run_stop_and_continue_past_breakpoints() {
    let sched = scheduler(RamMachine::new(0x1000), ShutdownToken::new());
    let mut table = BreakpointTable::new();
    table.add(0x40, &sched).unwrap();
    table.add(0x80, &sched).unwrap();

    assert_eq!(sched.step_and_wait(1000).unwrap(), ExecStatus::Breakpoint);
    assert_eq!(sched.pc(), 0x40);

    table.step_over_if_needed(&sched).unwrap();
    assert_eq!(sched.step_and_wait(1000).unwrap(), ExecStatus::Breakpoint);
    assert_eq!(sched.pc(), 0x80);

    // 両方のトラップが残っている
    for addr in [0x40, 0x80] {
        assert_eq!(sched.with_machine(|m| m.read_word(addr).unwrap()), TRAP_OPCODE);
    }
}

#[test]
fn test_reads_from_other_threads_while_running() {
    let sched = scheduler(RamMachine::new(0x1000), ShutdownToken::new());
    sched.step(100_000);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sched = Arc::clone(&sched);
            thread::spawn(move || {
                for _ in 0..50 {
                    // ステップの途中の状態は見えない
                    assert_eq!(sched.pc() % 4, 0);
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(sched.poll_idle(Duration::from_secs(5)).unwrap(), Some(ExecStatus::Ok));
}

#[test]
fn test_interrupt_wakes_machine_after_wait() {
    let mut machine = RamMachine::new(0x100);
    machine.write_word(0x8, WAIT_OPCODE).unwrap();
    let sched = scheduler(machine, ShutdownToken::new());

    sched.step(3);
    assert_eq!(
        sched.poll_idle(Duration::from_secs(1)).unwrap(),
        Some(ExecStatus::WaitingForInterrupt)
    );
    assert!(sched.snapshot().waiting);

    let device = {
        let sched = Arc::clone(&sched);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sched.interrupt(0x0002_0000, 7);
        })
    };
    assert_eq!(sched.step_and_wait(2).unwrap(), ExecStatus::Ok);
    device.join().unwrap();
    assert!(!sched.snapshot().waiting);
}

#[test]
fn test_interrupt_while_idle_runs_exactly_one_step() {
    let sched = scheduler(RamMachine::new(0x100), ShutdownToken::new());
    assert!(!sched.is_stepping());

    sched.interrupt(0x0003_0000, 5);
    assert_eq!(sched.poll_idle(Duration::from_secs(1)).unwrap(), Some(ExecStatus::Ok));
    assert_eq!(sched.pc(), 4);
    assert_eq!(
        sched.with_machine(|m| m.delivered_interrupts().to_vec()),
        vec![(0x0003_0000, 5)]
    );

    // 追加のステップは走らない
    thread::sleep(Duration::from_millis(30));
    assert!(!sched.is_stepping());
    assert_eq!(sched.pc(), 4);
}

#[test]
fn test_shutdown_terminates_pending_step() {
    let mut machine = RamMachine::new(0x100);
    machine.write_word(0, WAIT_OPCODE).unwrap();
    let token = ShutdownToken::new();
    let sched = scheduler(machine, token.clone());

    let waiter = {
        let sched = Arc::clone(&sched);
        thread::spawn(move || sched.step_and_wait(1))
    };
    thread::sleep(Duration::from_millis(20));
    sched.shutdown();
    assert!(waiter.join().unwrap().is_err());
    assert!(sched.step_and_wait(1).is_err());
}
