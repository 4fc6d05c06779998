//! Terminal preview of a rendered framebuffer.

use colored::Colorize;
use linebridge_core::Framebuffer;
use std::io::{self, Write};

/// Print each painted pixel as a 24-bit colour cell. Rows the module never
/// delivered are drawn as dots so partial renders are visible.
pub fn write_preview<W: Write>(out: &mut W, framebuffer: &Framebuffer) -> io::Result<()> {
    for y in 0..framebuffer.height() {
        if !framebuffer.is_painted(y) {
            writeln!(out, "{}", "·".repeat(framebuffer.width() as usize * 2))?;
            continue;
        }
        for x in 0..framebuffer.width() {
            let [r, g, b, a] = framebuffer.pixel(x, y).unwrap_or([0; 4]);
            let (r, g, b) = blend_on_black(r, g, b, a);
            write!(out, "{}", "  ".on_truecolor(r, g, b))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Terminals have no alpha; composite over black.
fn blend_on_black(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8) {
    let scale = |c: u8| ((c as u16 * a as u16) / 255) as u8;
    (scale(r), scale(g), scale(b))
}
