use crate::error::ReadError;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Read-only, bit-granular view over a byte slice.
///
/// Positions are absolute bit offsets from the start of the underlying
/// slice. A cursor may be narrowed with [`BitCursor::limit`] so that reads
/// stop at the end of a length-delimited scope even though more bytes
/// follow in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    pos: u64,
    end: u64,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len() as u64 * 8,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Absolute bit offset where the current scope ends.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn remaining_bits(&self) -> u64 {
        self.end.saturating_sub(self.pos)
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.pos % 8 == 0
    }

    fn check(&self, n: u64) -> Result<(), ReadError> {
        let remaining = self.remaining_bits();
        if n > remaining {
            return Err(ReadError::EndOfStream {
                at: self.pos,
                wanted: n,
                remaining,
            });
        }
        Ok(())
    }

    /// Read `n` bits MSB-first and advance.
    pub fn read_bits(&mut self, n: u32) -> Result<u64, ReadError> {
        let v = self.peek_bits(n)?;
        self.pos += n as u64;
        Ok(v)
    }

    pub fn peek_bits(&self, n: u32) -> Result<u64, ReadError> {
        if n > 64 {
            return Err(ReadError::WidthOutOfRange { width: n });
        }
        self.check(n as u64)?;
        if n == 0 {
            return Ok(0);
        }

        if self.is_byte_aligned() {
            let at = (self.pos / 8) as usize;
            match n {
                8 => return Ok(self.data[at] as u64),
                16 => return Ok(BigEndian::read_u16(&self.data[at..]) as u64),
                32 => return Ok(BigEndian::read_u32(&self.data[at..]) as u64),
                64 => return Ok(BigEndian::read_u64(&self.data[at..])),
                _ => {}
            }
        }

        Ok(extract_bits(self.data, self.pos, n))
    }

    pub fn skip_bits(&mut self, n: u64) -> Result<(), ReadError> {
        self.check(n)?;
        self.pos += n;
        Ok(())
    }

    /// Reposition absolutely. Offsets past the end of the scope are rejected.
    pub fn seek(&mut self, bit_offset: u64) -> Result<(), ReadError> {
        if bit_offset > self.end {
            return Err(ReadError::EndOfStream {
                at: self.pos,
                wanted: bit_offset.saturating_sub(self.pos),
                remaining: self.remaining_bits(),
            });
        }
        self.pos = bit_offset;
        Ok(())
    }

    /// A cursor over the next `bit_len` bits. `self` is not advanced.
    pub fn limit(&self, bit_len: u64) -> Result<BitCursor<'a>, ReadError> {
        self.check(bit_len)?;
        Ok(BitCursor {
            data: self.data,
            pos: self.pos,
            end: self.pos + bit_len,
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ReadError> {
        let bits = n as u64 * 8;
        self.check(bits)?;
        let out = if self.is_byte_aligned() {
            let at = (self.pos / 8) as usize;
            self.data[at..at + n].to_vec()
        } else {
            (0..n as u64)
                .map(|i| extract_bits(self.data, self.pos + i * 8, 8) as u8)
                .collect()
        };
        self.pos += bits;
        Ok(out)
    }

    /// Read `n` bits into a left-aligned byte string; a trailing partial
    /// byte is padded with zero bits.
    pub fn read_bits_to_bytes(&mut self, n: u64) -> Result<Vec<u8>, ReadError> {
        self.check(n)?;
        let mut out = Vec::with_capacity(n.div_ceil(8) as usize);
        let mut left = n;
        let mut at = self.pos;
        while left > 0 {
            let take = left.min(8) as u32;
            let bits = extract_bits(self.data, at, take) as u8;
            out.push(bits << (8 - take));
            at += take as u64;
            left -= take as u64;
        }
        self.pos += n;
        Ok(out)
    }

    /// Little-endian unsigned integer of `n_bytes` (1..=8) bytes.
    pub fn read_uint_le(&mut self, n_bytes: usize) -> Result<u64, ReadError> {
        if n_bytes == 0 || n_bytes > 8 {
            return Err(ReadError::WidthOutOfRange {
                width: n_bytes as u32 * 8,
            });
        }
        let buf = self.read_bytes(n_bytes)?;
        Ok(LittleEndian::read_uint(&buf, n_bytes))
    }
}

fn extract_bits(data: &[u8], pos: u64, n: u32) -> u64 {
    let mut value = 0u64;
    let mut at = pos;
    let mut left = n;
    while left > 0 {
        let byte = data[(at / 8) as usize];
        let offset = (at % 8) as u32;
        let avail = 8 - offset;
        let take = avail.min(left);
        let chunk = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);
        value = (value << take) | chunk as u64;
        at += take as u64;
        left -= take;
    }
    value
}

pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_unaligned_bits() {
        let mut c = BitCursor::new(&[0b1010_1100, 0b0101_0011]);
        assert_eq!(c.read_bits(3).unwrap(), 0b101);
        assert_eq!(c.read_bits(7).unwrap(), 0b01100_01);
        assert_eq!(c.position(), 10);
        assert_eq!(c.read_bits(6).unwrap(), 0b01_0011);
        assert_eq!(c.remaining_bits(), 0);
    }

    #[test]
    fn aligned_fast_path_matches_general_path() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x11];
        let mut c = BitCursor::new(&data);
        assert_eq!(c.read_bits(16).unwrap(), 0x1234);
        assert_eq!(c.read_bits(32).unwrap(), 0x5678_9abc);

        let mut c = BitCursor::new(&data);
        c.skip_bits(4).unwrap();
        assert_eq!(c.read_bits(64).unwrap(), 0x2345_6789_abcd_ef01);
    }

    #[test]
    fn peek_does_not_advance() {
        let c = BitCursor::new(&[0xff]);
        assert_eq!(c.peek_bits(4).unwrap(), 0xf);
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn read_past_end_reports_offset() {
        let mut c = BitCursor::new(&[0xab, 0xcd]);
        c.read_bits(12).unwrap();
        assert_eq!(
            c.read_bits(8).unwrap_err(),
            ReadError::EndOfStream {
                at: 12,
                wanted: 8,
                remaining: 4
            }
        );
        assert_eq!(c.position(), 12);
    }

    #[test]
    fn width_over_64_is_rejected() {
        let c = BitCursor::new(&[0u8; 16]);
        assert_eq!(
            c.peek_bits(65).unwrap_err(),
            ReadError::WidthOutOfRange { width: 65 }
        );
    }

    #[test]
    fn limit_narrows_scope() {
        let mut c = BitCursor::new(&[1, 2, 3, 4]);
        c.read_bits(8).unwrap();
        let mut sub = c.limit(16).unwrap();
        assert_eq!(sub.remaining_bits(), 16);
        assert_eq!(sub.read_bytes(2).unwrap(), vec![2, 3]);
        assert!(sub.read_bits(1).is_err());
        assert_eq!(c.position(), 8);
        assert!(c.limit(25).is_err());
    }

    #[test]
    fn seek_is_absolute_and_bounded() {
        let mut c = BitCursor::new(&[0x0f, 0xf0]);
        c.seek(4).unwrap();
        assert_eq!(c.read_bits(8).unwrap(), 0xff);
        assert!(c.seek(17).is_err());
        c.seek(16).unwrap();
        assert_eq!(c.remaining_bits(), 0);
    }

    #[test]
    fn unaligned_bytes_and_partial_bits() {
        let mut c = BitCursor::new(&[0x0a, 0xbc, 0xd0]);
        c.skip_bits(4).unwrap();
        assert_eq!(c.read_bytes(2).unwrap(), vec![0xab, 0xcd]);

        let mut c = BitCursor::new(&[0b1110_0000]);
        assert_eq!(c.read_bits_to_bytes(3).unwrap(), vec![0b1110_0000]);
    }

    #[test]
    fn little_endian_uint() {
        let mut c = BitCursor::new(&[0x34, 0x12, 0x00]);
        assert_eq!(c.read_uint_le(2).unwrap(), 0x1234);
        assert!(c.read_uint_le(9).is_err());
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0b111, 3), -1);
        assert_eq!(sign_extend(0b011, 3), 3);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }
}
