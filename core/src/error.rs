//! Fatal runtime errors. Any of these halts the VM; none are retried.

use thiserror::Error;

/// A fatal condition raised while decoding or executing an instruction.
///
/// Every variant, once surfaced through [`crate::vm::Vm::cycle`], halts the
/// VM and produces a traceback to stderr.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// `0x1000 + rom.len()` would exceed the memory size.
    #[error("ROM of {size} bytes does not fit in {capacity} bytes of remaining memory")]
    RomTooLarge { size: usize, capacity: usize },

    /// A memory access at `addr` fell outside `0..MEMORY_SIZE`.
    #[error("address 0x{addr:04X} is out of bounds")]
    MemoryOutOfBounds { addr: u16 },

    /// A decoded register index was outside `0..8`. Only reachable from a
    /// hand-corrupted ROM, since the assembler never emits one.
    #[error("register index {index} is out of range (expected 0..=7)")]
    InvalidRegister { index: u8 },

    /// The program counter advanced past the end of the loaded ROM.
    #[error("program counter 0x{pc:04X} exceeded ROM size ({rom_size} bytes)")]
    PcExceededRom { pc: u16, rom_size: usize },

    /// The fetched opcode byte has no matching instruction.
    #[error("unknown opcode 0x{opcode:02X} at 0x{pc:04X}")]
    UnknownOpcode { opcode: u8, pc: u16 },

    /// DIV with a zero divisor.
    #[error("division by zero")]
    DivisionByZero,

    /// POP or RET on an empty stack.
    #[error("stack underflow")]
    StackUnderflow,

    /// PUSH or CALL past [`crate::stack::MAX_DEPTH`].
    #[error("stack overflow: exceeded maximum depth of {max}")]
    StackOverflow { max: usize },

    /// Debug `SET_STACK`/traceback access with an out-of-range `index`.
    #[error("stack index {index} is out of range")]
    StackIndexOutOfRange { index: usize },

    /// HLT (explicit or via the debug plane) or any of the above, wrapped
    /// with the human-readable message that ends up in the traceback.
    #[error("{0}")]
    Halted(String),
}
