//! A Chip-8 virtual machine.
//!
//! [`Chip8`] owns all interpreter state and is driven by its caller: one
//! [`Chip8::tick`] per instruction, [`Chip8::tick_timers`] and
//! [`Chip8::draw`] once per 60 Hz frame, and [`Chip8::keypress`] for host
//! key events.

pub mod chip8;
pub mod display;
pub mod error;
pub mod font;
pub mod keypad;
pub mod quirks;

pub use chip8::{Chip8, Rom, Status};
pub use error::{Chip8Error, Fault};
pub use keypad::KeyAction;
pub use quirks::Quirks;
