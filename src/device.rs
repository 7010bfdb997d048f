//! Memory-mapped peripherals.

use std::io::Write;

use crate::error::MemoryError;
use crate::memory::Device;

/// Width of the character grid of [ScreenDevice].
pub const SCREEN_WIDTH: u16 = 32;

/// A character-cell screen that renders into a terminal using escape sequences.
///
/// A 16-bit write at offset `n` places a character at column `n % 32`, row `n / 32`.
/// The low byte is the character code. When the top nibble of the high byte is `0xF`
/// the high byte is a command:
/// - `0xFF` erases the screen and draws nothing.
/// - `0xF1` switches to bold before drawing the character.
/// - `0xF2` switches back to regular before drawing the character.
///
/// Reads always return 0.
pub struct ScreenDevice<W> {
    out: W,
}

impl<W: Write> ScreenDevice<W> {
    pub fn new(out: W) -> ScreenDevice<W> {
        ScreenDevice { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, addr: u16, character: u8) -> std::io::Result<()> {
        let x = (addr % SCREEN_WIDTH) + 1;
        let y = (addr / SCREEN_WIDTH) + 1;

        write!(self.out, "\x1b[{};{}H{}", y, x, character as char)?;
        self.out.flush()
    }

    fn command(&mut self, addr: u16, value: u16) -> std::io::Result<()> {
        let [command, character] = value.to_be_bytes();

        if command & 0xF0 == 0xF0 {
            match command {
                0xFF => {
                    write!(self.out, "\x1b[2J")?;
                    return self.out.flush();
                },
                0xF1 => write!(self.out, "\x1b[1m")?,
                0xF2 => write!(self.out, "\x1b[0m")?,
                _ => (),
            }
        }

        self.draw(addr, character)
    }
}

fn device_error(addr: u16, err: std::io::Error) -> MemoryError {
    MemoryError::Device {
        address: addr,
        message: err.to_string(),
    }
}

impl<W: Write> Device for ScreenDevice<W> {
    fn get_u8(&mut self, _addr: u16) -> Result<u8, MemoryError> {
        Ok(0)
    }

    fn get_u16(&mut self, _addr: u16) -> Result<u16, MemoryError> {
        Ok(0)
    }

    fn set_u8(&mut self, addr: u16, value: u8) -> Result<(), MemoryError> {
        self.draw(addr, value)
            .map_err(|err| device_error(addr, err))
    }

    fn set_u16(&mut self, addr: u16, value: u16) -> Result<(), MemoryError> {
        self.command(addr, value)
            .map_err(|err| device_error(addr, err))
    }
}

#[test]
fn test_screen_draws_character() {
    let mut screen = ScreenDevice::new(Vec::new());

    screen.set_u16(33, 0x0041).unwrap();

    assert_eq!(screen.get_ref().as_slice(), b"\x1b[2;2HA");
}

#[test]
fn test_screen_erase_draws_nothing() {
    let mut screen = ScreenDevice::new(Vec::new());

    screen.set_u16(5, 0xFF41).unwrap();

    assert_eq!(screen.into_inner(), b"\x1b[2J".to_vec());
}

#[test]
fn test_screen_bold_then_regular() {
    let mut screen = ScreenDevice::new(Vec::new());

    screen.set_u16(0, 0xF148).unwrap();
    screen.set_u16(1, 0xF269).unwrap();

    assert_eq!(
        String::from_utf8(screen.into_inner()).unwrap(),
        "\x1b[1m\x1b[1;1HH\x1b[0m\x1b[1;2Hi",
    );
    assert_eq!(ScreenDevice::new(std::io::sink()).get_u16(0), Ok(0));
}
