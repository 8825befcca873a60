//! Property: with a finite IPS cap, the number of instructions executed in
//! wall time T is bounded by roughly `cap * T`.

use std::time::{Duration, Instant};

use vm_core::vm::Vm;

fn tight_loop_rom() -> Vec<u8> {
    // LOOP: JMP LOOP -- an infinite loop that never halts on its own.
    vec![0x06, 0x00, 0x00]
}

#[test]
fn ips_cap_bounds_executed_instructions() {
    let cap = 2_000.0;
    let mut vm = Vm::with_ips_limit(&tight_loop_rom(), Some(cap)).unwrap();

    let run_time = Duration::from_millis(200);
    let start = Instant::now();
    let mut executed = 0u64;
    while start.elapsed() < run_time {
        vm.cycle();
        executed += 1;
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    let budget = cap * elapsed_secs + 500.0; // O(1) slack for scheduling jitter
    assert!(
        executed as f64 <= budget,
        "executed {executed} instructions in {elapsed_secs:.3}s, budget was {budget:.1}"
    );
}

#[test]
fn uncapped_vm_runs_without_sleeping() {
    let mut vm = Vm::new(&tight_loop_rom()).unwrap();
    let start = Instant::now();
    for _ in 0..50_000 {
        vm.cycle();
    }
    assert!(start.elapsed() < Duration::from_secs(2));
}
