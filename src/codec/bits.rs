//! Bit-level writer and reader, MSB-first within each field.

/// Number of bits needed to represent `value` (at least 1).
pub const fn bits_needed(value: usize) -> u32 {
    if value == 0 { 1 } else { usize::BITS - value.leading_zeros() }
}

/// Append-only bit vector.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn push_bit(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    /// Write the low `width` bits of `value`.
    pub fn write(&mut self, value: u32, width: u32) {
        debug_assert!(width <= 32);
        debug_assert!(width == 32 || value >> width == 0, "value {value} wider than {width} bits");
        for k in (0..width).rev() {
            self.push_bit((value >> k) & 1 == 1);
        }
    }

    /// The written bits, zero-padded to the next byte.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Sequential reader over a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() * 8 - self.pos
    }

    /// Read `width` bits, `None` once the input runs out.
    pub fn read(&mut self, width: u32) -> Option<u32> {
        if self.remaining() < width as usize {
            return None;
        }
        let mut value = 0u32;
        for _ in 0..width {
            let byte = self.bytes[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        Some(value)
    }

    /// True if every bit left is zero padding.
    pub fn only_padding_left(&self) -> bool {
        if self.remaining() >= 8 {
            return false;
        }
        let mut probe = self.clone();
        let rest = probe.remaining() as u32;
        probe.read(rest) == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(bits_needed(0), 1);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(40), 6);
        assert_eq!(bits_needed(79), 7);
        assert_eq!(bits_needed(80), 7);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
    }

    #[test]
    fn fields_cross_byte_boundaries() {
        let mut w = BitWriter::new();
        w.write(0b101, 3);
        w.write(0xAB, 8);
        w.write(1, 1);
        assert_eq!(w.len(), 12);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0b1011_0101, 0b0111_0000]);

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read(3), Some(0b101));
        assert_eq!(r.read(8), Some(0xAB));
        assert_eq!(r.read(1), Some(1));
        assert!(r.only_padding_left());
        assert_eq!(r.read(5), None);
    }

    #[test]
    fn non_zero_tail_is_not_padding() {
        let bytes = [0b0000_0001];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read(2), Some(0));
        assert!(!r.only_padding_left());
    }
}
