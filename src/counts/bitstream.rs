//! MSB-first bit I/O with Elias gamma and delta codes

use std::io::Write;

use crate::{error::CountsError, Result};

/// Completed bytes buffered before they are handed to the sink
const FLUSH_THRESHOLD: usize = 4096;

/// Writes bits to an underlying sink, most significant bit first
#[derive(Debug)]
pub struct BitWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    current_byte: u8,
    bit_position: u8,
    bits_written: u64,
}
impl<W: Write> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(FLUSH_THRESHOLD),
            current_byte: 0,
            bit_position: 0,
            bits_written: 0,
        }
    }

    /// Write a single bit
    #[inline]
    pub fn write_bit(&mut self, bit: bool) -> Result<()> {
        if bit {
            self.current_byte |= 1 << (7 - self.bit_position);
        }
        self.bit_position += 1;
        self.bits_written += 1;

        if self.bit_position == 8 {
            self.buffer.push(self.current_byte);
            self.current_byte = 0;
            self.bit_position = 0;
            if self.buffer.len() >= FLUSH_THRESHOLD {
                self.inner.write_all(&self.buffer)?;
                self.buffer.clear();
            }
        }
        Ok(())
    }

    /// Write the `num_bits` low bits of `value`
    #[inline]
    pub fn write_bits(&mut self, value: u64, num_bits: u32) -> Result<()> {
        debug_assert!(num_bits <= 64);
        for i in (0..num_bits).rev() {
            self.write_bit((value >> i) & 1 == 1)?;
        }
        Ok(())
    }

    /// Elias gamma code of `value`, which must be positive
    pub fn write_gamma(&mut self, value: u64) -> Result<()> {
        assert!(value > 0, "gamma codes start at 1");
        let num_bits = 63 - value.leading_zeros();
        for _ in 0..num_bits {
            self.write_bit(false)?;
        }
        self.write_bits(value, num_bits + 1)
    }

    /// Elias delta code of `value`, which must be positive
    pub fn write_delta(&mut self, value: u64) -> Result<()> {
        assert!(value > 0, "delta codes start at 1");
        let bit_len = 64 - value.leading_zeros();
        self.write_gamma(u64::from(bit_len))?;
        self.write_bits(value, bit_len - 1)
    }

    /// Number of bits written so far
    #[must_use]
    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    /// Pads the last byte with zeros, flushes and returns the sink
    pub fn finish(mut self) -> Result<W> {
        if self.bit_position > 0 {
            self.buffer.push(self.current_byte);
        }
        self.inner.write_all(&self.buffer)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads bits from a byte slice, most significant bit first
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_position: u64,
}
impl<'a> BitReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    /// Read a single bit
    #[inline]
    pub fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.data.get((self.bit_position / 8) as usize)?;
        let bit = (byte >> (7 - (self.bit_position % 8))) & 1 == 1;
        self.bit_position += 1;
        Some(bit)
    }

    /// Read `num_bits` bits as an unsigned value
    #[inline]
    pub fn read_bits(&mut self, num_bits: u32) -> Option<u64> {
        debug_assert!(num_bits <= 64);
        let mut value = 0u64;
        for _ in 0..num_bits {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Some(value)
    }

    pub fn read_gamma(&mut self) -> Result<u64> {
        let start = self.bit_position;
        let mut num_bits = 0u32;
        loop {
            match self.read_bit() {
                Some(false) => num_bits += 1,
                Some(true) => break,
                None => return Err(CountsError::TruncatedStream(start).into()),
            }
            if num_bits > 63 {
                return Err(CountsError::ValueOverflow(start).into());
            }
        }
        let rest = self
            .read_bits(num_bits)
            .ok_or(CountsError::TruncatedStream(start))?;
        Ok((1 << num_bits) | rest)
    }

    pub fn read_delta(&mut self) -> Result<u64> {
        let start = self.bit_position;
        let bit_len = self.read_gamma()?;
        if bit_len > 64 {
            return Err(CountsError::ValueOverflow(start).into());
        }
        let bit_len = bit_len as u32;
        let rest = self
            .read_bits(bit_len - 1)
            .ok_or(CountsError::TruncatedStream(start))?;
        Ok((1 << (bit_len - 1)) | rest)
    }

    /// Position of the next unread bit
    #[must_use]
    pub fn position(&self) -> u64 {
        self.bit_position
    }

    /// Moves to an absolute bit offset
    pub fn seek(&mut self, bit_position: u64) {
        self.bit_position = bit_position;
    }

    /// Total number of bits available
    #[must_use]
    pub fn len(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Maps signed integers to unsigned so small magnitudes stay small
#[inline]
#[must_use]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
#[must_use]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_writer_reader() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bit(true).unwrap();
        writer.write_bit(false).unwrap();
        writer.write_bit(true).unwrap();
        writer.write_bits(0b1010_1010, 8).unwrap();
        writer.write_bits(0xFF, 8).unwrap();
        assert_eq!(writer.bits_written(), 19);
        let data = writer.finish().unwrap();
        assert_eq!(data.len(), 3);

        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bit(), Some(true));
        assert_eq!(reader.read_bit(), Some(false));
        assert_eq!(reader.read_bit(), Some(true));
        assert_eq!(reader.read_bits(8), Some(0b1010_1010));
        assert_eq!(reader.read_bits(8), Some(0xFF));
        assert_eq!(reader.position(), 19);
    }

    #[test]
    fn test_gamma_codes() {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_gamma(1).unwrap();
        writer.write_gamma(2).unwrap();
        writer.write_gamma(5).unwrap();
        // 1 | 010 | 00101
        assert_eq!(writer.bits_written(), 9);
        let data = writer.finish().unwrap();
        assert_eq!(data, vec![0b1010_0010, 0b1000_0000]);

        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_gamma().unwrap(), 1);
        assert_eq!(reader.read_gamma().unwrap(), 2);
        assert_eq!(reader.read_gamma().unwrap(), 5);
    }

    #[test]
    fn test_delta_codes_extremes() {
        let values = [1, 2, 3, 17, 1 << 20, u64::from(u32::MAX), u64::MAX - 1, u64::MAX];
        let mut writer = BitWriter::new(Vec::new());
        for &v in &values {
            writer.write_delta(v).unwrap();
            writer.write_gamma(v).unwrap();
        }
        let data = writer.finish().unwrap();
        let mut reader = BitReader::new(&data);
        for &v in &values {
            assert_eq!(reader.read_delta().unwrap(), v);
            assert_eq!(reader.read_gamma().unwrap(), v);
        }
    }

    #[test]
    fn test_truncated_gamma() {
        let mut reader = BitReader::new(&[0u8]);
        assert!(reader.read_gamma().is_err());
        let mut reader = BitReader::new(&[0b0001_0000]);
        reader.seek(1);
        assert_eq!(reader.read_gamma().unwrap(), 4);
        // seven leading zeros need seven more bits than remain
        let mut reader = BitReader::new(&[0b0000_0001]);
        assert!(reader.read_gamma().is_err());
    }

    #[test]
    fn test_large_streams_flush() {
        let mut writer = BitWriter::new(Vec::new());
        for i in 1..=10_000u64 {
            writer.write_gamma(i).unwrap();
        }
        let bits = writer.bits_written();
        let data = writer.finish().unwrap();
        assert_eq!(data.len() as u64, bits.div_ceil(8));
        let mut reader = BitReader::new(&data);
        for i in 1..=10_000u64 {
            assert_eq!(reader.read_gamma().unwrap(), i);
        }
    }

    #[test]
    fn test_zigzag() {
        for (value, encoded) in [(0i64, 0u64), (-1, 1), (1, 2), (-2, 3), (2, 4)] {
            assert_eq!(zigzag_encode(value), encoded);
            assert_eq!(zigzag_decode(encoded), value);
        }
        for value in -10_000..10_000 {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
        assert_eq!(zigzag_decode(zigzag_encode(i64::MIN)), i64::MIN);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MAX)), i64::MAX);
    }
}
