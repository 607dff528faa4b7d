//! Protocol-buffer encoding of glyph ranges.
//!
//! The schema served to map renderers:
//!
//! ```text
//! message glyph     { uint32 id = 1; bytes bitmap = 2; uint32 width = 3; uint32 height = 4;
//!                     sint32 left = 5; sint32 top = 6; uint32 advance = 7; }
//! message fontstack { string name = 1; string range = 2; repeated glyph glyphs = 3; }
//! message glyphs    { repeated fontstack stacks = 1; }
//! ```

use std::fmt;

const VARINT: u32 = 0;
const LENGTH_DELIMITED: u32 = 2;

/// An inclusive block of code points rendered into one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphRange {
    pub start: u32,
    pub end: u32,
}

impl GlyphRange {
    pub fn contains(&self, code_point: u32) -> bool {
        (self.start..=self.end).contains(&code_point)
    }
}

impl fmt::Display for GlyphRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One rendered glyph.
///
/// `bitmap` is a signed distance field of `(width + 2 * buffer)` by
/// `(height + 2 * buffer)` bytes; it is empty for glyphs without ink.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Glyph {
    pub id: u32,
    pub bitmap: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
    pub advance: u32,
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    fn key(&mut self, field: u32, wire_type: u32) {
        self.varint(u64::from((field << 3) | wire_type));
    }

    fn uint32(&mut self, field: u32, value: u32) {
        self.key(field, VARINT);
        self.varint(u64::from(value));
    }

    fn sint32(&mut self, field: u32, value: i32) {
        self.key(field, VARINT);
        self.varint(u64::from(((value << 1) ^ (value >> 31)) as u32));
    }

    fn bytes(&mut self, field: u32, value: &[u8]) {
        self.key(field, LENGTH_DELIMITED);
        self.varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }
}

fn encode_glyph(glyph: &Glyph) -> Vec<u8> {
    let mut w = Writer::default();
    w.uint32(1, glyph.id);
    if !glyph.bitmap.is_empty() {
        w.bytes(2, &glyph.bitmap);
    }
    w.uint32(3, glyph.width);
    w.uint32(4, glyph.height);
    w.sint32(5, glyph.left);
    w.sint32(6, glyph.top);
    w.uint32(7, glyph.advance);
    w.buf
}

/// Encode the glyphs of one range of one font stack.
pub fn encode(font: &str, range: GlyphRange, glyphs: &[Glyph]) -> Vec<u8> {
    let mut stack = Writer::default();
    stack.bytes(1, font.as_bytes());
    stack.bytes(2, range.to_string().as_bytes());
    for glyph in glyphs {
        stack.bytes(3, &encode_glyph(glyph));
    }

    let mut message = Writer::default();
    message.bytes(1, &stack.buf);
    message.buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint() {
        let mut w = Writer::default();
        w.varint(1);
        w.varint(300);
        assert_eq!(w.buf, vec![0x01, 0xac, 0x02]);
    }

    #[test]
    fn test_zigzag() {
        let mut w = Writer::default();
        w.sint32(1, -1);
        w.sint32(1, 1);
        w.sint32(1, -2);
        assert_eq!(w.buf, vec![0x08, 0x01, 0x08, 0x02, 0x08, 0x03]);
    }

    #[test]
    fn test_empty_range() {
        let bytes = encode("A", GlyphRange { start: 0, end: 255 }, &[]);
        assert_eq!(
            bytes,
            vec![0x0a, 0x0a, 0x0a, 0x01, b'A', 0x12, 0x05, b'0', b'-', b'2', b'5', b'5']
        );
    }

    #[test]
    fn test_glyph_without_bitmap() {
        let glyph = Glyph {
            id: 32,
            advance: 6,
            ..Default::default()
        };
        assert_eq!(
            encode_glyph(&glyph),
            vec![0x08, 32, 0x18, 0, 0x20, 0, 0x28, 0, 0x30, 0, 0x38, 6]
        );
    }

    #[test]
    fn test_range_display() {
        let range = GlyphRange { start: 256, end: 511 };
        assert_eq!(range.to_string(), "256-511");
        assert!(range.contains(300));
        assert!(!range.contains(512));
    }
}
