use std::io;

/// Errors surfaced by loading a program or running the VM.
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("error reading Chip-8 ROM: {0}")]
    Io(#[from] io::Error),

    #[error("VM halted: {0}")]
    Fault(#[from] Fault),
}

/// A fatal condition that halts the VM.
///
/// Once raised, the fault is latched and every subsequent `tick` returns it
/// until the VM is re-initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("stack overflow: call at {pc:#06X} exceeds 16 nested subroutines")]
    StackOverflow { pc: u16 },

    #[error("stack underflow: return at {pc:#06X} with an empty call stack")]
    StackUnderflow { pc: u16 },

    #[error("memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("display access out of bounds at pixel {position}")]
    DisplayOutOfBounds { position: i32 },

    #[error("key index {key:#04X} is outside the 16-key matrix")]
    InvalidKey { key: u8 },
}
