use std::fs;
use std::io::Read;
use std::ops::{Deref, Range};
use std::path::Path;

use crate::display::Display;
use crate::error::{Chip8Error, Fault};
use crate::font::{BIG_FONT, FONT, GLYPH_BYTES};
use crate::keypad::{self, KeyAction};
use crate::quirks::{self, Quirks};

// Number of bytes in the Chip8's memory.
pub const MEM_BYTES: usize = 4096;
// Where programs are loaded and execution starts.
pub const PROGRAM_START: usize = 0x200;
// Maximum bytes of a user's ROM; anything past this is dropped.
pub const MAX_ROM_BYTES: usize = MEM_BYTES - PROGRAM_START;
// Nested subroutine calls the stack can hold.
pub const STACK_DEPTH: usize = 16;

const VF: usize = 0x0F;

/// What the VM is doing after a `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    /// Parked on Fx0A until a key is pressed. Keep calling `tick`.
    AwaitingKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    AwaitingKey { register: usize },
    Halted(Fault),
}

/// A Chip8 virtual machine.
///
/// The VM only ever runs one instruction per `tick`. Frame pacing, the 60 Hz
/// timer decrement and host input translation belong to the caller.
#[derive(Debug, Clone)]
pub struct Chip8 {
    memory: [u8; MEM_BYTES],
    registers: [u8; 16],
    stack: [u16; STACK_DEPTH],
    pc: u16,
    index: u16,
    sp: usize,
    display: Display,
    keys: [bool; 16],
    quirks: Quirks,
    state: State,
    /// Delay timer, decremented by the caller at 60 Hz.
    pub dt: u8,
    /// Sound timer, decremented by the caller at 60 Hz; beeps while non-zero.
    pub st: u8,
}

impl Chip8 {
    /// Returns a new Chip8 with fonts loaded and no program.
    pub fn new() -> Self {
        let mut memory = [0; MEM_BYTES];
        memory[..FONT.len()].copy_from_slice(&FONT);
        memory[FONT.len()..FONT.len() + BIG_FONT.len()].copy_from_slice(&BIG_FONT);
        Chip8 {
            memory,
            registers: [0; 16],
            stack: [0; STACK_DEPTH],
            pc: PROGRAM_START as u16,
            index: 0,
            sp: 0,
            display: Display::new(),
            keys: [false; 16],
            quirks: Quirks::default(),
            state: State::Running,
            dt: 0,
            st: 0,
        }
    }

    /// Returns a new Chip8 with `rom` loaded.
    pub fn with_rom(rom: &Rom) -> Self {
        let mut chip8 = Chip8::new();
        chip8.load(rom);
        chip8
    }

    /// Resets the VM and loads the program at `path`.
    ///
    /// If the file can't be read the error is returned and the VM is left as
    /// it was; don't `tick` a VM that never loaded a program.
    pub fn initialize<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Chip8Error> {
        let rom = Rom::from_file(path)?;
        self.load(&rom);
        Ok(())
    }

    /// Resets all state and loads `rom` at 0x200, then picks the
    /// compatibility flags for it.
    pub fn load(&mut self, rom: &Rom) {
        *self = Chip8::new();
        self.memory[PROGRAM_START..PROGRAM_START + rom.len()].copy_from_slice(rom);

        let checksum = quirks::checksum(&self.memory[PROGRAM_START..]);
        self.quirks = Quirks::for_checksum(checksum);
        log::info!("loaded {} byte program (checksum {checksum})", rom.len());
    }

    /// Executes exactly one instruction.
    ///
    /// A fault halts the VM; it is returned from this and every later call
    /// until the VM is loaded again.
    pub fn tick(&mut self) -> Result<Status, Fault> {
        match self.state {
            State::Halted(fault) => return Err(fault),
            State::AwaitingKey { register } => return Ok(self.poll_key(register)),
            State::Running => {}
        }

        if let Err(fault) = self.fetch().and_then(|instr| self.execute(instr)) {
            log::error!("{fault}");
            self.state = State::Halted(fault);
            return Err(fault);
        }
        Ok(self.status())
    }

    /// Renders the display as 64x32 row-major RGB triplets.
    pub fn draw(&self) -> Vec<u8> {
        self.display.to_rgb()
    }

    /// Like `draw`, reusing `buf`'s allocation.
    pub fn draw_into(&self, buf: &mut Vec<u8>) {
        self.display.to_rgb_into(buf);
    }

    /// Records a host key event. Repeats and unmapped keys are ignored.
    pub fn keypress(&mut self, key: char, action: KeyAction) {
        if action == KeyAction::Repeat {
            return;
        }
        if let Some(k) = keypad::map_key(key) {
            self.keys[k as usize] = action == KeyAction::Press;
        }
    }

    /// Decrements both timers toward zero. Call once per 60 Hz frame.
    pub fn tick_timers(&mut self) {
        self.dt = self.dt.saturating_sub(1);
        self.st = self.st.saturating_sub(1);
    }

    /// Whether the VM is running or parked on Fx0A.
    pub fn status(&self) -> Status {
        match self.state {
            State::AwaitingKey { .. } => Status::AwaitingKey,
            _ => Status::Running,
        }
    }

    /// The fault that halted the VM, if any.
    pub fn fault(&self) -> Option<Fault> {
        match self.state {
            State::Halted(fault) => Some(fault),
            _ => None,
        }
    }

    /// Address of the next instruction.
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// The I register.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// V0 through VF.
    pub fn registers(&self) -> &[u8; 16] {
        &self.registers
    }

    /// All 4 KiB of memory, fonts included.
    pub fn memory(&self) -> &[u8; MEM_BYTES] {
        &self.memory
    }

    /// The display cells.
    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Compatibility flags picked for the loaded program.
    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// True if hex key `key` is down. Keys past 0xF are never down.
    pub fn is_key_pressed(&self, key: u8) -> bool {
        self.keys.get(key as usize).copied().unwrap_or(false)
    }

    // Fetches the next instruction and advances the PC past it.
    fn fetch(&mut self) -> Result<Instr, Fault> {
        let pc = self.pc as usize;
        match self.memory.get(pc..pc + 2) {
            Some(&[a, b]) => {
                self.pc = self.pc.wrapping_add(2);
                Ok(Instr([a, b]))
            }
            _ => Err(Fault::MemoryOutOfBounds { address: pc }),
        }
    }

    fn execute(&mut self, instr: Instr) -> Result<(), Fault> {
        let x = instr.x();
        let y = instr.y();
        // address of the instruction being executed
        let at = self.pc.wrapping_sub(2);

        match instr.0 {
            // clear display, 0?E0
            [a, 0xE0] if a & 0xF0 == 0x00 => self.display.clear(),

            // return from subroutine, 0?EE
            [a, 0xEE] if a & 0xF0 == 0x00 => {
                if self.sp == 0 {
                    return Err(Fault::StackUnderflow { pc: at });
                }
                self.sp -= 1;
                self.pc = self.stack[self.sp];
            }

            // extended-mode screen ops, not part of the base set
            [a, 0xC0] | [a, 0xFB] | [a, 0xFC] | [a, 0xFD] | [a, 0xFE] | [a, 0xFF] if a & 0xF0 == 0x00 => {
                log::debug!("ignoring extended opcode {:#06X} at {at:#05X}", instr.word());
            }

            // jump to addr, 1nnn
            [a, _] if a & 0xF0 == 0x10 => {
                self.pc = instr.addr();
            }

            // call subroutine at nnn, 2nnn
            [a, _] if a & 0xF0 == 0x20 => {
                if self.sp >= STACK_DEPTH {
                    return Err(Fault::StackOverflow { pc: at });
                }
                self.stack[self.sp] = self.pc;
                self.sp += 1;
                self.pc = instr.addr();
            }

            // skip if Vx == kk, 3xkk
            [a, b] if a & 0xF0 == 0x30 => {
                if self.registers[x] == b {
                    self.skip();
                }
            }

            // skip if Vx != kk, 4xkk
            [a, b] if a & 0xF0 == 0x40 => {
                if self.registers[x] != b {
                    self.skip();
                }
            }

            // skip if Vx == Vy, 5xy0
            [a, _] if a & 0xF0 == 0x50 => {
                if self.registers[x] == self.registers[y] {
                    self.skip();
                }
            }

            // set register, 6xkk
            [a, b] if a & 0xF0 == 0x60 => {
                self.registers[x] = b;
            }

            // wrapping add to register, 7xkk
            [a, b] if a & 0xF0 == 0x70 => {
                self.registers[x] = self.registers[x].wrapping_add(b);
            }

            [a, b] if a & 0xF0 == 0x80 => self.alu(x, y, b & 0x0F),

            // skip if Vx != Vy, 9xy0
            [a, _] if a & 0xF0 == 0x90 => {
                if self.registers[x] != self.registers[y] {
                    self.skip();
                }
            }

            // set index register to nnn, Annn
            [a, _] if a & 0xF0 == 0xA0 => {
                self.index = instr.addr();
            }

            // jump to V0 + nnn, Bnnn
            [a, _] if a & 0xF0 == 0xB0 => {
                self.pc = instr.addr() + self.registers[0x00] as u16;
            }

            // Vx = (random) & kk, Cxkk
            [a, b] if a & 0xF0 == 0xC0 => {
                let r: u8 = rand::random();
                self.registers[x] = r & b;
            }

            // draw n bytes from I at Vx,Vy, Dxyn
            [a, _] if a & 0xF0 == 0xD0 => {
                let rows = self.mem_range(self.index as usize, instr.n() as usize)?;
                let collision = self.display.draw_sprite(
                    self.registers[x],
                    self.registers[y],
                    &self.memory[rows],
                    self.quirks.clip_sprites,
                )?;
                self.registers[VF] = collision as u8;
            }

            // skip if key Vx pressed, Ex9E
            [a, b] if a & 0xF0 == 0xE0 && b & 0x0F == 0x0E => {
                if self.key(self.registers[x])? {
                    self.skip();
                }
            }

            // skip if key Vx not pressed, ExA1
            [a, b] if a & 0xF0 == 0xE0 && b & 0x0F == 0x01 => {
                if !self.key(self.registers[x])? {
                    self.skip();
                }
            }

            // Vx = dt, Fx07
            [a, 0x07] if a & 0xF0 == 0xF0 => {
                self.registers[x] = self.dt;
            }

            // Vx = next keypress, Fx0A
            // park on this instruction until a key is down
            [a, 0x0A] if a & 0xF0 == 0xF0 => {
                self.pc = at;
                self.state = State::AwaitingKey { register: x };
                self.poll_key(x);
            }

            // dt = Vx, Fx15
            [a, 0x15] if a & 0xF0 == 0xF0 => {
                self.dt = self.registers[x];
            }

            // st = Vx, Fx18
            [a, 0x18] if a & 0xF0 == 0xF0 => {
                self.st = self.registers[x];
            }

            // I = I + Vx, VF = 1 past 0xFFF, Fx1E
            [a, 0x1E] if a & 0xF0 == 0xF0 => {
                self.registers[VF] = (self.index as u32 + self.registers[x] as u32 > 0xFFF) as u8;
                self.index = self.index.wrapping_add(self.registers[x] as u16);
            }

            // I = location of hex glyph for Vx, Fx29
            [a, 0x29] if a & 0xF0 == 0xF0 => {
                self.index = self.registers[x] as u16 * GLYPH_BYTES;
            }

            // mem[I] = hundreds, I+1 = tens, I+2 = ones of Vx, Fx33
            [a, 0x33] if a & 0xF0 == 0xF0 => {
                let digits = self.mem_range(self.index as usize, 3)?;
                let val = self.registers[x];
                self.memory[digits].copy_from_slice(&[val / 100, (val / 10) % 10, (val % 100) % 10]);
            }

            // store V0 through Vx starting at memory[I], Fx55
            [a, 0x55] if a & 0xF0 == 0xF0 => {
                let dest = self.mem_range(self.index as usize, x + 1)?;
                self.memory[dest].copy_from_slice(&self.registers[..=x]);
                self.advance_index(x);
            }

            // read V0 through Vx from memory starting at I, Fx65
            [a, 0x65] if a & 0xF0 == 0xF0 => {
                let src = self.mem_range(self.index as usize, x + 1)?;
                self.registers[..=x].copy_from_slice(&self.memory[src]);
                self.advance_index(x);
            }

            // extended-mode font and flag ops, not part of the base set
            [a, 0x30] | [a, 0x75] | [a, 0x85] if a & 0xF0 == 0xF0 => {
                log::debug!("ignoring extended opcode {:#06X} at {at:#05X}", instr.word());
            }

            // machine routines and unassigned encodings do nothing
            _ => {}
        }
        Ok(())
    }

    // 8xy? register ops. VF is written before the result, and the result
    // re-reads its operands, so VF as an operand sees the new flag.
    fn alu(&mut self, x: usize, y: usize, op: u8) {
        let vx = self.registers[x];
        let vy = self.registers[y];
        match op {
            // Vx = Vy
            0x0 => self.registers[x] = vy,
            // Vx |= Vy
            0x1 => self.registers[x] |= vy,
            // Vx &= Vy
            0x2 => self.registers[x] &= vy,
            // Vx ^= Vy
            0x3 => self.registers[x] ^= vy,
            // Vx += Vy, VF = carry
            0x4 => {
                self.registers[VF] = (vx as u16 + vy as u16 > 0xFF) as u8;
                self.registers[x] = self.registers[x].wrapping_add(self.registers[y]);
            }
            // Vx -= Vy, VF = not borrow
            0x5 => {
                self.registers[VF] = (vy <= vx) as u8;
                self.registers[x] = self.registers[x].wrapping_sub(self.registers[y]);
            }
            // Vx >>= 1, VF = old lsb. Vy is not read.
            0x6 => {
                self.registers[VF] = vx & 0x01;
                self.registers[x] >>= 1;
            }
            // Vx = Vy - Vx, VF = not borrow
            0x7 => {
                self.registers[VF] = (vy >= vx) as u8;
                self.registers[x] = self.registers[y].wrapping_sub(self.registers[x]);
            }
            // Vx <<= 1, VF = old msb. Vy is not read.
            0xE => {
                self.registers[VF] = vx >> 7;
                self.registers[x] <<= 1;
            }
            _ => {}
        }
    }

    // Fx0A: takes the highest pressed key, if any, and resumes.
    fn poll_key(&mut self, register: usize) -> Status {
        match self.keys.iter().rposition(|&pressed| pressed) {
            Some(key) => {
                self.registers[register] = key as u8;
                // every pressed key is consumed, not only the one taken
                self.keys.fill(false);
                self.pc = self.pc.wrapping_add(2);
                self.state = State::Running;
                Status::Running
            }
            None => Status::AwaitingKey,
        }
    }

    fn skip(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }

    fn advance_index(&mut self, x: usize) {
        if self.quirks.increment_index {
            self.index = self.index.wrapping_add(x as u16 + 1);
        }
    }

    fn key(&self, key: u8) -> Result<bool, Fault> {
        self.keys
            .get(key as usize)
            .copied()
            .ok_or(Fault::InvalidKey { key })
    }

    // Bounds-checks `len` bytes of memory starting at `start`.
    fn mem_range(&self, start: usize, len: usize) -> Result<Range<usize>, Fault> {
        let end = start + len;
        if end > MEM_BYTES {
            return Err(Fault::MemoryOutOfBounds { address: start });
        }
        Ok(start..end)
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

/// A Chip8 program image.
#[derive(Debug, Clone, PartialEq)]
pub struct Rom {
    code: Vec<u8>,
}

impl Rom {
    /// Returns a new Chip8 ROM.
    ///
    /// Code past `MAX_ROM_BYTES` doesn't fit in memory and is dropped.
    pub fn with_code(mut code: Vec<u8>) -> Self {
        if code.len() > MAX_ROM_BYTES {
            log::warn!(
                "ROM is {} bytes, truncating to the {MAX_ROM_BYTES} bytes that fit in memory",
                code.len()
            );
            code.truncate(MAX_ROM_BYTES);
        }
        Rom { code }
    }

    /// Reads a ROM from `reader` until EOF.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, Chip8Error> {
        let mut code = Vec::new();
        reader.read_to_end(&mut code)?;
        Ok(Rom::with_code(code))
    }

    /// Reads a ROM from the file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Chip8Error> {
        let code = fs::read(path)?;
        Ok(Rom::with_code(code))
    }
}

impl Deref for Rom {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.code
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
// An instruction word, high byte first.
struct Instr([u8; 2]);

impl Instr {
    fn word(&self) -> u16 {
        u16::from_be_bytes(self.0)
    }

    fn addr(&self) -> u16 {
        self.word() & 0x0FFF
    }

    fn x(&self) -> usize {
        (self.0[0] & 0x0F) as usize
    }

    fn y(&self) -> usize {
        (self.0[1] >> 4) as usize
    }

    fn n(&self) -> u8 {
        self.0[1] & 0x0F
    }
}
