use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::{cursor, execute, queue, terminal};

use chip8vm::display::{HEIGHT, WIDTH};
use chip8vm::{Chip8, Chip8Error, KeyAction, Status};

const FRAME: Duration = Duration::from_nanos(1_000_000_000 / 60);
// Frames a key stays down when the terminal can't report releases.
const KEY_HOLD_FRAMES: u32 = 6;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// A Chip-8 virtual machine for the terminal.
///
/// 1-4, Q-R, A-F and Z-V are the hex keypad. F5 reloads the ROM, Esc quits.
/// Logging goes to stderr and is set with RUST_LOG.
struct Cli {
    /// The binary ROM file to run
    #[arg(long, value_name = "BINARY")]
    rom: PathBuf,

    /// Instructions executed per 60 Hz frame
    #[arg(long, value_name = "N", default_value_t = 10)]
    cycles_per_frame: u32,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();
    if let Err(e) = run(&args) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn run(args: &Cli) -> Result<(), Chip8Error> {
    let mut chip8 = Chip8::new();
    chip8.initialize(&args.rom)?;

    let mut term = Terminal::enter()?;
    // keys waiting on a synthesized release: (key, frames left)
    let mut held: Vec<(char, u32)> = Vec::new();
    let mut frame = Vec::new();
    let mut beeping = false;

    loop {
        let start = Instant::now();

        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::F(5) if key.kind == KeyEventKind::Press => {
                    match chip8.initialize(&args.rom) {
                        Ok(()) => held.clear(),
                        Err(e) => log::warn!("reload failed, still running previous program: {e}"),
                    }
                }
                KeyCode::Char(c) => {
                    let action = match key.kind {
                        KeyEventKind::Press => KeyAction::Press,
                        KeyEventKind::Release => KeyAction::Release,
                        KeyEventKind::Repeat => KeyAction::Repeat,
                    };
                    chip8.keypress(c, action);
                    if !term.reports_releases && action == KeyAction::Press {
                        held.retain(|&(k, _)| k != c);
                        held.push((c, KEY_HOLD_FRAMES));
                    }
                }
                _ => {}
            }
        }

        for _ in 0..args.cycles_per_frame {
            if chip8.tick()? == Status::AwaitingKey {
                break;
            }
        }
        chip8.tick_timers();

        held.retain_mut(|(key, frames)| {
            *frames -= 1;
            if *frames == 0 {
                chip8.keypress(*key, KeyAction::Release);
            }
            *frames > 0
        });

        if chip8.st > 0 && !beeping {
            term.beep()?;
        }
        beeping = chip8.st > 0;

        chip8.draw_into(&mut frame);
        term.render(&frame)?;

        if let Some(rest) = FRAME.checked_sub(start.elapsed()) {
            thread::sleep(rest);
        }
    }
}

// Raw-mode alternate screen, restored on drop.
struct Terminal {
    out: Stdout,
    reports_releases: bool,
}

impl Terminal {
    fn enter() -> io::Result<Self> {
        let mut out = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(
            out,
            terminal::EnterAlternateScreen,
            terminal::Clear(terminal::ClearType::All),
            cursor::Hide
        )?;

        let reports_releases = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if reports_releases {
            execute!(
                out,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        } else {
            log::info!("terminal can't report key releases, releasing keys after {KEY_HOLD_FRAMES} frames");
        }
        Ok(Terminal { out, reports_releases })
    }

    // Two display rows per terminal row: top pixel in the foreground of an
    // upper half block, bottom pixel in the background.
    fn render(&mut self, rgb: &[u8]) -> io::Result<()> {
        queue!(self.out, cursor::MoveTo(0, 0))?;
        for y in (0..HEIGHT).step_by(2) {
            for x in 0..WIDTH {
                queue!(
                    self.out,
                    SetForegroundColor(pixel_color(rgb, x, y)),
                    SetBackgroundColor(pixel_color(rgb, x, y + 1)),
                    Print('\u{2580}')
                )?;
            }
            queue!(self.out, ResetColor, cursor::MoveToNextLine(1))?;
        }
        self.out.flush()
    }

    fn beep(&mut self) -> io::Result<()> {
        queue!(self.out, Print('\u{7}'))
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.reports_releases {
            let _ = execute!(self.out, PopKeyboardEnhancementFlags);
        }
        let _ = execute!(self.out, ResetColor, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

fn pixel_color(rgb: &[u8], x: usize, y: usize) -> Color {
    let i = (x + y * WIDTH) * 3;
    Color::Rgb {
        r: rgb[i],
        g: rgb[i + 1],
        b: rgb[i + 2],
    }
}
