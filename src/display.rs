use crate::error::Fault;

pub const WIDTH: usize = 64;
pub const HEIGHT: usize = 32;
pub const PIXELS: usize = WIDTH * HEIGHT;
// Bytes in one RGB frame produced by `Display::to_rgb`.
pub const RGB_BYTES: usize = PIXELS * 3;

const LAST_PIXEL: i32 = PIXELS as i32 - 1;
const ON: [u8; 3] = [255, 255, 255];
const OFF: [u8; 3] = [0, 0, 0];

/// The 64x32 monochrome display, one cell per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    cells: [u8; PIXELS],
}

impl Display {
    pub fn new() -> Self {
        Display { cells: [0; PIXELS] }
    }

    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Returns the cell at column `x`, row `y`, or `None` off screen.
    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x < WIDTH && y < HEIGHT {
            Some(self.cells[x + y * WIDTH])
        } else {
            None
        }
    }

    pub fn cells(&self) -> &[u8; PIXELS] {
        &self.cells
    }

    /// XORs `rows` onto the display with its top-left corner at (`x`, `y`).
    ///
    /// Each set bit lands on linear position `(x + col) + (y + row) * 64`.
    /// A position past the last pixel is either discarded (`clip`) or walked
    /// back up one row at a time until it lands on the display, so a sprite
    /// that runs off the right edge continues on the next row and one that
    /// runs off the bottom folds back onto the bottom rows.
    ///
    /// Returns true if any lit pixel was turned off.
    pub fn draw_sprite(&mut self, x: u8, y: u8, rows: &[u8], clip: bool) -> Result<bool, Fault> {
        let x = x as i32;
        let y = y as i32;
        let mut collision = false;

        for (row, &bits) in (0i32..).zip(rows) {
            for col in 0..8i32 {
                if bits & (0x80 >> col) == 0 {
                    continue;
                }

                let mut position = (x + col) + (y + row) * WIDTH as i32;
                if position < 0 && !clip {
                    position = LAST_PIXEL;
                }
                if position > LAST_PIXEL && clip {
                    continue;
                }
                let mut step = 1;
                while position > LAST_PIXEL {
                    position = (x + col) + ((y - step) + row) * WIDTH as i32;
                    step += 1;
                }

                // not reachable: x and y are unsigned and the walk-back ends on the last row
                let cell = usize::try_from(position)
                    .ok()
                    .and_then(|p| self.cells.get_mut(p))
                    .ok_or(Fault::DisplayOutOfBounds { position })?;
                if *cell == 1 {
                    collision = true;
                }
                *cell ^= 1;
            }
        }

        Ok(collision)
    }

    /// Renders the display as RGB triplets, white for lit cells.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RGB_BYTES);
        self.to_rgb_into(&mut buf);
        buf
    }

    /// Like `to_rgb`, reusing `buf`'s allocation.
    pub fn to_rgb_into(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.reserve(RGB_BYTES);
        for &cell in &self.cells {
            buf.extend_from_slice(if cell == 1 { &ON } else { &OFF });
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}
