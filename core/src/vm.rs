//! The decode/execute loop tying memory, registers, stack, framebuffer and
//! PRNG together.

use std::time::{Duration, Instant};

use crate::error::RuntimeError;
use crate::framebuffer::FrameBuffer;
use crate::isa::{Opcode, ROM_BASE};
use crate::memory::Memory;
use crate::prng::{self, Prng};
use crate::registers::Registers;
use crate::stack::Stack;

/// A ready-to-run virtual machine: one ROM, one set of registers/memory/
/// stack/framebuffer/PRNG, and the bookkeeping needed to pace and report
/// instructions-per-second.
pub struct Vm {
    memory: Memory,
    registers: Registers,
    stack: Stack,
    pc: u16,
    framebuffer: FrameBuffer,
    prng: Prng,

    halted: bool,
    fatal: bool,
    paused: bool,
    stop_requested: bool,

    instructions_executed: u64,
    window_start: Instant,
    ips_limit: Option<f64>,
    last_reported_ips: Option<f64>,
}

impl Vm {
    /// A fresh VM with the given ROM loaded at [`ROM_BASE`] and no IPS cap.
    pub fn new(rom: &[u8]) -> Result<Self, RuntimeError> {
        Self::with_ips_limit(rom, None)
    }

    /// A fresh VM, optionally capped to `ips_limit` instructions per second.
    pub fn with_ips_limit(rom: &[u8], ips_limit: Option<f64>) -> Result<Self, RuntimeError> {
        let mut memory = Memory::new();
        memory.load_rom(rom)?;
        Ok(Self {
            memory,
            registers: Registers::new(),
            stack: Stack::new(),
            pc: ROM_BASE,
            framebuffer: FrameBuffer::new(),
            prng: Prng::new(),
            halted: false,
            fatal: false,
            paused: false,
            stop_requested: false,
            instructions_executed: 0,
            window_start: Instant::now(),
            ips_limit,
            last_reported_ips: None,
        })
    }

    // -- Status -------------------------------------------------------

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// `true` only for a halt caused by a runtime error (unknown opcode,
    /// division by zero, an out-of-bounds access, ...). A program's own
    /// `HLT` and an explicit debug `Halt` request are not fatal.
    pub fn fatal(&self) -> bool {
        self.fatal
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// Set the program counter directly (debug `SET_PC`).
    pub fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn set_register(&mut self, index: u8, value: i32) -> Result<(), RuntimeError> {
        self.registers.set(index, value)
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn read_memory(&self, addr: u16) -> Result<u8, RuntimeError> {
        self.memory.read(addr)
    }

    pub fn write_memory(&mut self, addr: u16, value: u8) -> Result<(), RuntimeError> {
        self.memory.write(addr, value)
    }

    pub fn write_memory_bytes(&mut self, addr: u16, data: &[u8]) -> Result<(), RuntimeError> {
        self.memory.write_bytes(addr, data)
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn set_stack_from_top(&mut self, index: usize, value: i32) -> Result<(), RuntimeError> {
        self.stack.set_from_top(index, value)
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    /// The instructions-per-second figure from the most recently closed
    /// measurement window, if at least one has elapsed.
    pub fn last_reported_ips(&self) -> Option<f64> {
        self.last_reported_ips
    }

    // -- Pause/resume/halt (shared by the executor and the debug plane) --

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Halt with `message`, printing a traceback to stderr. Idempotent:
    /// halting an already-halted VM is a no-op (monotonic flag).
    pub fn halt(&mut self, message: impl Into<String>) {
        self.halt_with(message, false);
    }

    fn halt_with(&mut self, message: impl Into<String>, fatal: bool) {
        if self.halted {
            return;
        }
        self.halted = true;
        self.fatal = fatal;
        self.print_traceback(&message.into());
    }

    fn print_traceback(&self, message: &str) {
        eprintln!("TRACEBACK:");
        eprintln!("Program Counter (PC): 0x{:04X}", self.pc);
        eprintln!("Registers:");
        for (i, value) in self.registers.snapshot().iter().enumerate() {
            eprintln!("  R{i}: 0x{:08X}", *value as u32);
        }
        eprintln!("Stack:");
        for (i, value) in self.stack.snapshot().iter().rev().enumerate() {
            eprintln!("  {i}: 0x{:08X}", *value as u32);
        }
        eprintln!("Memory (16 bytes around PC):");
        let (start, window) = self.memory.window_around(self.pc, 8);
        for (offset, byte) in window.iter().enumerate() {
            if offset % 16 == 0 && offset != 0 {
                eprintln!();
            }
            eprint!("  0x{:04X}: 0x{byte:02X}", start + offset);
        }
        eprintln!();
        eprintln!("Message: {message}");
    }

    // -- Execution ------------------------------------------------------

    /// Run one cycle: fetch, decode, execute exactly one instruction, then
    /// pace/report per the IPS cap. A no-op if halted or paused.
    pub fn cycle(&mut self) {
        if self.halted || self.paused {
            return;
        }

        if let Err(err) = self.try_cycle() {
            // A program's own HLT surfaces as `RuntimeError::Halted` too,
            // but it is not a fatal condition; every other error is.
            let fatal = !matches!(err, RuntimeError::Halted(_));
            let message = err.to_string();
            self.halt_with(message, fatal);
            return;
        }

        self.instructions_executed += 1;
        self.pace_and_report();
    }

    fn try_cycle(&mut self) -> Result<(), RuntimeError> {
        let offset = self.pc as i64 - ROM_BASE as i64;
        if offset >= self.memory.rom_size() as i64 {
            return Err(RuntimeError::PcExceededRom {
                pc: self.pc,
                rom_size: self.memory.rom_size(),
            });
        }

        let opcode_byte = self.fetch_u8()?;
        let opcode = Opcode::from_byte(opcode_byte).ok_or(RuntimeError::UnknownOpcode {
            opcode: opcode_byte,
            pc: self.pc,
        })?;
        self.execute(opcode)
    }

    fn fetch_u8(&mut self) -> Result<u8, RuntimeError> {
        let byte = self.memory.read(self.pc)?;
        self.pc = self.pc.wrapping_add(1);
        Ok(byte)
    }

    fn fetch_u16(&mut self) -> Result<u16, RuntimeError> {
        let lo = self.fetch_u8()? as u16;
        let hi = self.fetch_u8()? as u16;
        Ok(lo | (hi << 8))
    }

    fn fetch_u32(&mut self) -> Result<u32, RuntimeError> {
        let b0 = self.fetch_u8()? as u32;
        let b1 = self.fetch_u8()? as u32;
        let b2 = self.fetch_u8()? as u32;
        let b3 = self.fetch_u8()? as u32;
        Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
    }

    /// Fetch a branch/CALL address operand, normalised to add [`ROM_BASE`].
    /// All branch-shaped instructions add the base uniformly; see the
    /// design note about the original source's inconsistent base handling.
    fn fetch_branch_target(&mut self) -> Result<u16, RuntimeError> {
        let raw = self.fetch_u16()?;
        Ok(ROM_BASE.wrapping_add(raw))
    }

    fn execute(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        match opcode {
            Opcode::Nop => {}
            Opcode::Mov => {
                let r = self.fetch_u8()?;
                let imm = self.fetch_u16()?;
                self.registers.set(r, imm as i32)?;
            }
            Opcode::Add => {
                let r1 = self.fetch_u8()?;
                let r2 = self.fetch_u8()?;
                let v1 = self.registers.get(r1)?;
                let v2 = self.registers.get(r2)?;
                self.registers.set(r1, v1.wrapping_add(v2))?;
            }
            Opcode::Sub => {
                let r1 = self.fetch_u8()?;
                let r2 = self.fetch_u8()?;
                let v1 = self.registers.get(r1)?;
                let v2 = self.registers.get(r2)?;
                self.registers.set(r1, v1.wrapping_sub(v2))?;
            }
            Opcode::Load => {
                let r = self.fetch_u8()?;
                let addr = self.fetch_u16()?;
                let byte = self.memory.read(addr)?;
                self.registers.set(r, byte as i32)?;
            }
            Opcode::Str => {
                let addr = self.fetch_u16()?;
                let r = self.fetch_u8()?;
                let value = self.registers.get(r)?;
                self.memory.write(addr, (value & 0xFF) as u8)?;
            }
            Opcode::Jmp => {
                let target = self.fetch_branch_target()?;
                self.pc = target;
            }
            Opcode::Call => {
                let target = self.fetch_branch_target()?;
                // Return address is the PC *after* the operand has been
                // fetched, i.e. the address of the instruction after CALL.
                self.stack.push(self.pc as i32)?;
                self.pc = target;
            }
            Opcode::Ret => {
                let addr = self.stack.pop()?;
                self.pc = addr as u16;
            }
            Opcode::Push => {
                let r = self.fetch_u8()?;
                let value = self.registers.get(r)?;
                self.stack.push(value)?;
            }
            Opcode::Pop => {
                let r = self.fetch_u8()?;
                let value = self.stack.pop()?;
                self.registers.set(r, value)?;
            }
            Opcode::Jz => {
                let r = self.fetch_u8()?;
                let target = self.fetch_branch_target()?;
                if self.registers.get(r)? == 0 {
                    self.pc = target;
                }
            }
            Opcode::Jnz => {
                let r = self.fetch_u8()?;
                let target = self.fetch_branch_target()?;
                if self.registers.get(r)? != 0 {
                    self.pc = target;
                }
            }
            Opcode::Jg => {
                let r = self.fetch_u8()?;
                let target = self.fetch_branch_target()?;
                if self.registers.get(r)? > 0 {
                    self.pc = target;
                }
            }
            Opcode::Jl => {
                let r = self.fetch_u8()?;
                let target = self.fetch_branch_target()?;
                if self.registers.get(r)? < 0 {
                    self.pc = target;
                }
            }
            Opcode::Jeq => {
                let r1 = self.fetch_u8()?;
                let r2 = self.fetch_u8()?;
                let target = self.fetch_branch_target()?;
                if self.registers.get(r1)? == self.registers.get(r2)? {
                    self.pc = target;
                }
            }
            Opcode::Jne => {
                let r1 = self.fetch_u8()?;
                let r2 = self.fetch_u8()?;
                let target = self.fetch_branch_target()?;
                if self.registers.get(r1)? != self.registers.get(r2)? {
                    self.pc = target;
                }
            }
            Opcode::Drw => {
                let rx = self.fetch_u8()?;
                let ry = self.fetch_u8()?;
                let rc = self.fetch_u8()?;
                let x = self.registers.get(rx)?;
                let y = self.registers.get(ry)?;
                let c = self.registers.get(rc)?;
                self.framebuffer.draw_pixel(x, y, c);
            }
            Opcode::Clr => self.framebuffer.clear(),
            Opcode::Render => self.framebuffer.render(),
            Opcode::Div => {
                let r1 = self.fetch_u8()?;
                let r2 = self.fetch_u8()?;
                let v1 = self.registers.get(r1)?;
                let v2 = self.registers.get(r2)?;
                if v2 == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                self.registers.set(r1, v1.wrapping_div(v2))?;
            }
            Opcode::Mul => {
                let r1 = self.fetch_u8()?;
                let r2 = self.fetch_u8()?;
                let v1 = self.registers.get(r1)?;
                let v2 = self.registers.get(r2)?;
                self.registers.set(r1, v1.wrapping_mul(v2))?;
            }
            Opcode::Rect => {
                let rx = self.fetch_u8()?;
                let ry = self.fetch_u8()?;
                let rw = self.fetch_u8()?;
                let rh = self.fetch_u8()?;
                let rc = self.fetch_u8()?;
                let x = self.registers.get(rx)?;
                let y = self.registers.get(ry)?;
                let w = self.registers.get(rw)?;
                let h = self.registers.get(rh)?;
                let c = self.registers.get(rc)?;
                self.framebuffer.draw_rect(x, y, w, h, c);
            }
            Opcode::Rnd => {
                let r = self.fetch_u8()?;
                let value = self.prng.next();
                self.registers.set(r, value as i32)?;
            }
            Opcode::Seed => {
                let seed = self.fetch_u32()?;
                self.prng.reseed(seed);
            }
            Opcode::Rndmap => {
                let r = self.fetch_u8()?;
                let min = self.fetch_u16()? as i32;
                let max = self.fetch_u16()? as i32;
                // Read R *before* overwriting it.
                let input = self.registers.get(r)? as u32;
                let mapped = prng::map_to_range(input, min, max);
                self.registers.set(r, mapped)?;
            }
            Opcode::Hlt => return Err(RuntimeError::Halted("HLT by program".to_string())),
        }
        Ok(())
    }

    fn pace_and_report(&mut self) {
        if let Some(limit) = self.ips_limit {
            if limit.is_finite() && limit > 0.0 {
                let elapsed = self.window_start.elapsed().as_secs_f64();
                let expected = self.instructions_executed as f64 / limit;
                if elapsed < expected {
                    std::thread::sleep(Duration::from_secs_f64(expected - elapsed));
                }
            }
        }

        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let ips = self.instructions_executed as f64 / elapsed.as_secs_f64();
            self.last_reported_ips = Some(ips);
            println!("Instructions Per Second: {ips:.2}");
            self.window_start = Instant::now();
            self.instructions_executed = 0;
        }
    }
}
