/// The kind of host key event fed into `Chip8::keypress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Release,
    Press,
    /// Auto-repeat while held. Ignored by the VM.
    Repeat,
}

/// Conventional hex keypad laid over the left side of a QWERTY keyboard:
///
/// ```text
///  1 2 3 4        1 2 3 C
///  Q W E R   ->   4 5 6 D
///  A S D F        7 8 9 E
///  Z X C V        A 0 B F
/// ```
const KEYMAP: [(char, u8); 16] = [
    ('1', 0x1),
    ('2', 0x2),
    ('3', 0x3),
    ('4', 0xC),
    ('Q', 0x4),
    ('W', 0x5),
    ('E', 0x6),
    ('R', 0xD),
    ('A', 0x7),
    ('S', 0x8),
    ('D', 0x9),
    ('F', 0xE),
    ('Z', 0xA),
    ('X', 0x0),
    ('C', 0xB),
    ('V', 0xF),
];

/// Maps a host key to a VM key index, case-insensitively.
pub fn map_key(key: char) -> Option<u8> {
    let key = key.to_ascii_uppercase();
    KEYMAP
        .iter()
        .find(|(host, _)| *host == key)
        .map(|&(_, vm)| vm)
}
