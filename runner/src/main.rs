//! `vmrun`: assemble (if needed), load, and execute a ROM, with a debug
//! control socket running alongside the executor thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread;

use clap::{Parser, Subcommand};

use vm_core::vm::Vm;

#[derive(Parser)]
#[command(name = "vmrun", about = "Run bytecode VM programs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble (if needed) and run a ROM, serving the debug socket
    /// alongside it until the program halts.
    Run {
        /// Path to a ROM image, or to assembly source (with `--asm`).
        path: PathBuf,

        /// Cap execution to roughly this many instructions per second.
        #[arg(long)]
        ips: Option<f64>,

        /// Address the debug control socket listens on.
        #[arg(long, default_value_t = vm_debug::DEFAULT_ADDR.to_string())]
        debug_addr: String,

        /// Treat `path` as assembly source rather than a raw ROM image.
        #[arg(long)]
        asm: bool,
    },
}

fn main() -> ExitCode {
    match Cli::parse().command {
        Command::Run {
            path,
            ips,
            debug_addr,
            asm,
        } => run(&path, ips, &debug_addr, asm),
    }
}

fn run(path: &Path, ips: Option<f64>, debug_addr: &str, asm: bool) -> ExitCode {
    let rom = match load_rom(path, asm) {
        Ok(rom) => rom,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let vm = match Vm::with_ips_limit(&rom, ips) {
        Ok(vm) => vm,
        Err(err) => {
            eprintln!("failed to load ROM: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "Loaded {} bytes from {}; debug socket on {debug_addr}",
        rom.len(),
        path.display()
    );

    let vm = Arc::new(Mutex::new(vm));

    let debug_vm = Arc::clone(&vm);
    let debug_addr_owned = debug_addr.to_string();
    let debug_handle = thread::spawn(move || {
        if let Err(err) = vm_debug::serve(debug_vm, debug_addr_owned.as_str()) {
            eprintln!("debug server stopped: {err}");
        }
    });

    let executor_vm = Arc::clone(&vm);
    let executor_handle = thread::spawn(move || loop {
        let mut guard = executor_vm.lock().unwrap();
        if guard.halted() || guard.stop_requested() {
            break;
        }
        guard.cycle();
        drop(guard);
    });

    executor_handle
        .join()
        .expect("executor thread panicked");

    vm.lock().unwrap().request_stop();
    // The debug server only re-checks for shutdown between connections;
    // joining it is best-effort so a lingering idle client can't hang exit.
    let _ = debug_handle.join();

    // Non-zero only for a runtime-error halt; a program's own HLT and a
    // stop requested without a fatal condition both exit cleanly.
    if vm.lock().unwrap().fatal() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn load_rom(path: &Path, asm: bool) -> Result<Vec<u8>, String> {
    let is_source = asm
        || matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("s") | Some("asm")
        );

    if is_source {
        let source = fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        vm_assembler::assemble(&source).map_err(|err| format!("assembly failed: {err}"))
    } else {
        fs::read(path).map_err(|err| format!("failed to read {}: {err}", path.display()))
    }
}
