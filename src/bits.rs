use encoding_rs::Encoding;
use num_bigint::BigUint;

use crate::result::{Error, Result};
use crate::utils::{be_from_wire, be_to_wire, mask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    Little,
    #[default]
    Big,
}

/// A bit sequence, LSB-first within each backing byte.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bits {
    bytes: Vec<u8>,
    len: usize,
}

impl Bits {
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len.div_ceil(8)],
            len,
        }
    }

    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        let mut this = Self {
            bytes: bytes[..len.div_ceil(8)].to_vec(),
            len,
        };
        this.mask_tail();
        this
    }

    pub fn from_u64(value: u64, len: usize) -> Self {
        let mut this = Self::zeroed(len);
        let value = value & mask(len);
        for (i, byte) in this.bytes.iter_mut().enumerate() {
            *byte = (value >> (i * 8)) as u8;
        }
        this
    }

    pub fn from_biguint(value: &BigUint, len: usize) -> Self {
        let le = value.to_bytes_le();
        let mut this = Self::zeroed(len);
        let take = le.len().min(this.bytes.len());
        this.bytes[..take].copy_from_slice(&le[..take]);
        this.mask_tail();
        this
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bit(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.bytes[index / 8] >> (index % 8) & 1 == 1
    }

    pub fn set_bit(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len);
        if value {
            self.bytes[index / 8] |= 1 << (index % 8);
        } else {
            self.bytes[index / 8] &= !(1 << (index % 8));
        }
    }

    /// The low 64 bits of the sequence as an integer.
    pub fn to_u64(&self) -> u64 {
        let mut acc = 0u64;
        for (i, byte) in self.bytes.iter().take(8).enumerate() {
            acc |= u64::from(*byte) << (i * 8);
        }
        acc & mask(self.len)
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.bytes)
    }

    /// The same sequence truncated or zero-extended to `len` bits.
    pub fn resized(&self, len: usize) -> Bits {
        if len == self.len {
            return self.clone();
        }
        let mut out = Bits::zeroed(len);
        let take = self.bytes.len().min(out.bytes.len());
        out.bytes[..take].copy_from_slice(&self.bytes[..take]);
        out.mask_tail();
        out
    }

    /// The sequence mirrored end-to-end.
    pub fn reversed(&self) -> Bits {
        let mut out = Bits::zeroed(self.len);
        for i in 0..self.len {
            if self.bit(i) {
                out.set_bit(self.len - 1 - i, true);
            }
        }
        out
    }

    fn mask_tail(&mut self) {
        let tail = self.len % 8;
        if tail != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= (1u8 << tail) - 1;
            }
        }
    }

    fn put_chunk(&mut self, offset: usize, chunk: u8, count: usize) {
        let byte = offset / 8;
        let shift = offset % 8;
        self.bytes[byte] |= chunk << shift;
        if shift + count > 8 {
            self.bytes[byte + 1] |= chunk >> (8 - shift);
        }
    }

    fn chunk_at(&self, offset: usize, count: usize) -> u8 {
        let byte = offset / 8;
        let shift = offset % 8;
        let mut chunk = self.bytes[byte] >> shift;
        if shift + count > 8 && byte + 1 < self.bytes.len() {
            chunk |= self.bytes[byte + 1] << (8 - shift);
        }
        chunk & ((1u16 << count) - 1) as u8
    }
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    pos: usize,
    cache: u8,
    remaining: u8,
}

/// Bit-addressable view over a byte buffer. Bits come out LSB-first within
/// each byte; bytes advance in buffer order.
#[derive(Debug)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    pos: usize,
    cache: u8,
    remaining: u8,
    fallback: Option<Snapshot>,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            cache: 0,
            remaining: 0,
            fallback: None,
        }
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    pub fn position_bits(&self) -> usize {
        self.pos * 8 - self.remaining as usize
    }

    pub fn position_bytes(&self) -> usize {
        self.position_bits() / 8
    }

    pub fn available_bits(&self) -> usize {
        (self.buf.len() - self.pos) * 8 + self.remaining as usize
    }

    pub fn has_remaining(&self) -> bool {
        self.available_bits() > 0
    }

    /// Moves to a byte boundary, dropping any cached bits.
    pub fn set_position_bytes(&mut self, index: usize) {
        self.pos = index.min(self.buf.len());
        self.cache = 0;
        self.remaining = 0;
    }

    pub fn fallback(&mut self) {
        self.fallback = Some(Snapshot {
            pos: self.pos,
            cache: self.cache,
            remaining: self.remaining,
        });
    }

    pub fn restore(&mut self) {
        if let Some(snap) = self.fallback.take() {
            self.pos = snap.pos;
            self.cache = snap.cache;
            self.remaining = snap.remaining;
        }
    }

    fn ensure(&self, bits: usize) -> Result<()> {
        let available = self.available_bits();
        if bits > available {
            return Err(Error::Underflow {
                requested: bits,
                available,
            });
        }
        Ok(())
    }

    fn ensure_aligned(&self) -> Result<()> {
        if self.remaining != 0 {
            return Err(Error::Misaligned {
                position: self.position_bits(),
            });
        }
        Ok(())
    }

    fn refill(&mut self) {
        self.cache = self.buf[self.pos];
        self.pos += 1;
        self.remaining = 8;
    }

    pub fn get_bits(&mut self, bits: usize) -> Result<Bits> {
        self.ensure(bits)?;
        let mut out = Bits::zeroed(bits);
        let mut filled = 0;
        while filled < bits {
            if self.remaining == 0 {
                self.refill();
            }
            let take = (self.remaining as usize).min(bits - filled);
            out.put_chunk(filled, self.cache & ((1u16 << take) - 1) as u8, take);
            self.cache >>= take;
            self.remaining -= take as u8;
            filled += take;
        }
        Ok(out)
    }

    /// Reads `bits ≤ 64` as an unsigned integer: the natural little-endian
    /// reading, byte-group-reversed on big-endian requests (a trailing
    /// partial group sits at the end of the wire form).
    pub fn get_uint(&mut self, bits: usize, order: ByteOrder) -> Result<u64> {
        debug_assert!(bits <= 64);
        self.ensure(bits)?;
        let mut acc = 0u64;
        let mut filled = 0;
        while filled < bits {
            if self.remaining == 0 {
                self.refill();
            }
            let take = (self.remaining as usize).min(bits - filled);
            let chunk = u64::from(self.cache) & mask(take);
            acc |= chunk << filled;
            self.cache >>= take;
            self.remaining -= take as u8;
            filled += take;
        }
        match order {
            ByteOrder::Little => Ok(acc),
            ByteOrder::Big => Ok(be_from_wire(acc, bits)),
        }
    }

    pub fn get_big_uint(&mut self, bits: usize, order: ByteOrder) -> Result<BigUint> {
        let seq = self.get_bits(bits)?;
        match order {
            ByteOrder::Little => Ok(seq.to_biguint()),
            ByteOrder::Big => {
                let mut out = BigUint::from(0u8);
                let mut rem = bits;
                for byte in seq.as_bytes() {
                    let take = rem.min(8);
                    out = (out << take) | BigUint::from(byte & ((1u16 << take) - 1) as u8);
                    rem -= take;
                }
                Ok(out)
            }
        }
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.get_exact::<1>()?[0])
    }

    pub fn get_u16(&mut self, order: ByteOrder) -> Result<u16> {
        let bytes = self.get_exact::<2>()?;
        Ok(match order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn get_u32(&mut self, order: ByteOrder) -> Result<u32> {
        let bytes = self.get_exact::<4>()?;
        Ok(match order {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn get_u64(&mut self, order: ByteOrder) -> Result<u64> {
        let bytes = self.get_exact::<8>()?;
        Ok(match order {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        })
    }

    pub fn get_f32(&mut self, order: ByteOrder) -> Result<f32> {
        Ok(f32::from_bits(self.get_u32(order)?))
    }

    pub fn get_f64(&mut self, order: ByteOrder) -> Result<f64> {
        Ok(f64::from_bits(self.get_u64(order)?))
    }

    fn get_exact<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.get_bytes(N)?);
        Ok(out)
    }

    pub fn get_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.ensure_aligned()?;
        self.ensure(count * 8)?;
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn get_text(&mut self, count: usize, charset: &'static Encoding) -> Result<String> {
        let bytes = self.get_bytes(count)?;
        Ok(charset.decode_without_bom_handling(bytes).0.into_owned())
    }

    /// Accumulates bytes up to (not including) `terminator` or the end of
    /// the buffer. With `consume`, the terminator itself is advanced past.
    pub fn get_text_until(
        &mut self,
        terminator: u8,
        consume: bool,
        charset: &'static Encoding,
    ) -> Result<String> {
        let bytes = self.take_until(terminator, consume)?;
        Ok(charset.decode_without_bom_handling(bytes).0.into_owned())
    }

    pub fn skip(&mut self, bits: usize) -> Result<()> {
        self.ensure(bits)?;
        let mut left = bits;
        while left > 0 {
            if self.remaining == 0 {
                if left >= 8 && self.pos + left / 8 <= self.buf.len() {
                    self.pos += left / 8;
                    left %= 8;
                    continue;
                }
                self.refill();
            }
            let take = (self.remaining as usize).min(left);
            self.cache >>= take;
            self.remaining -= take as u8;
            left -= take;
        }
        Ok(())
    }

    pub fn skip_until(&mut self, terminator: u8, consume: bool) -> Result<()> {
        self.take_until(terminator, consume)?;
        Ok(())
    }

    fn take_until(&mut self, terminator: u8, consume: bool) -> Result<&'a [u8]> {
        self.ensure_aligned()?;
        let start = self.pos;
        while self.pos < self.buf.len() && self.buf[self.pos] != terminator {
            self.pos += 1;
        }
        let slice = &self.buf[start..self.pos];
        if consume && self.pos < self.buf.len() {
            self.pos += 1;
        }
        Ok(slice)
    }

    /// A no-advance view of the next `count` bytes, `None` when fewer remain.
    pub fn peek_bytes(&self, count: usize) -> Option<&'a [u8]> {
        let start = self.position_bytes();
        self.buf.get(start..start + count)
    }
}

/// Mirror of the reader: accumulates bits in a 64-bit cache and spills whole
/// bytes into the output as soon as they complete.
#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    cache: u64,
    remaining: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_bits(&self) -> usize {
        self.out.len() * 8 + self.remaining as usize
    }

    fn ensure_aligned(&self) -> Result<()> {
        if self.remaining != 0 {
            return Err(Error::Misaligned {
                position: self.position_bits(),
            });
        }
        Ok(())
    }

    fn spill(&mut self) {
        while self.remaining >= 8 {
            self.out.push(self.cache as u8);
            self.cache >>= 8;
            self.remaining -= 8;
        }
    }

    /// Appends the low `bits ≤ 64` bits of `value`, byte-group-reversed on
    /// big-endian requests — the exact inverse of `BitReader::get_uint`.
    pub fn put_uint(&mut self, value: u64, bits: usize, order: ByteOrder) {
        debug_assert!(bits <= 64);
        let mut value = match order {
            ByteOrder::Little => value & mask(bits),
            ByteOrder::Big => be_to_wire(value & mask(bits), bits),
        };
        let mut left = bits;
        while left > 0 {
            let free = 64 - self.remaining as usize;
            let take = free.min(left);
            self.cache |= (value & mask(take)) << self.remaining;
            self.remaining += take as u8;
            value = value.checked_shr(take as u32).unwrap_or(0);
            left -= take;
            self.spill();
        }
    }

    pub fn put_bits(&mut self, bits: &Bits) {
        let mut offset = 0;
        while offset < bits.len() {
            let take = 8.min(bits.len() - offset);
            self.put_uint(u64::from(bits.chunk_at(offset, take)), take, ByteOrder::Little);
            offset += take;
        }
    }

    pub fn put_big_uint(&mut self, value: &BigUint, bits: usize, order: ByteOrder) {
        match order {
            ByteOrder::Little => self.put_bits(&Bits::from_biguint(value, bits)),
            ByteOrder::Big => {
                // peel the trailing partial group off the value's bottom,
                // then whole bytes; the wire carries them most significant
                // first
                let mut groups = Vec::with_capacity(bits.div_ceil(8));
                let mut value = value.clone();
                let mut rem = bits;
                let mut take = match bits % 8 {
                    0 => 8,
                    partial => partial,
                };
                let byte_mask = BigUint::from(0xFFu8);
                while rem > 0 {
                    let now = take.min(rem);
                    let group: BigUint = &value & &byte_mask;
                    groups.push((group.to_bytes_le()[0], now));
                    value >>= now;
                    rem -= now;
                    take = 8;
                }
                for (group, width) in groups.into_iter().rev() {
                    self.put_uint(u64::from(group), width, ByteOrder::Little);
                }
            }
        }
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_exact(&[value])
    }

    pub fn put_u16(&mut self, value: u16, order: ByteOrder) -> Result<()> {
        self.put_exact(&match order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        })
    }

    pub fn put_u32(&mut self, value: u32, order: ByteOrder) -> Result<()> {
        self.put_exact(&match order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        })
    }

    pub fn put_u64(&mut self, value: u64, order: ByteOrder) -> Result<()> {
        self.put_exact(&match order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        })
    }

    pub fn put_f32(&mut self, value: f32, order: ByteOrder) -> Result<()> {
        self.put_u32(value.to_bits(), order)
    }

    pub fn put_f64(&mut self, value: f64, order: ByteOrder) -> Result<()> {
        self.put_u64(value.to_bits(), order)
    }

    fn put_exact(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_bytes(bytes)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_aligned()?;
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    pub fn put_text(&mut self, text: &str, charset: &'static Encoding) -> Result<()> {
        let (bytes, ..) = charset.encode(text);
        self.put_bytes(&bytes)
    }

    pub fn put_text_terminated(
        &mut self,
        text: &str,
        terminator: u8,
        consume: bool,
        charset: &'static Encoding,
    ) -> Result<()> {
        self.put_text(text, charset)?;
        if consume {
            self.put_u8(terminator)?;
        }
        Ok(())
    }

    pub fn pad(&mut self, bits: usize) {
        let mut left = bits;
        while left > 0 {
            let take = left.min(64);
            self.put_uint(0, take, ByteOrder::Little);
            left -= take;
        }
    }

    /// Emits the trailing fractional byte, zero-padded to a full byte.
    pub fn flush(&mut self) {
        self.spill();
        if self.remaining > 0 {
            self.out.push(self.cache as u8);
            self.cache = 0;
            self.remaining = 0;
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.out
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_reads_are_lsb_first() {
        let mut reader = BitReader::new(&[0b1010_0110, 0xFF]);
        assert_eq!(reader.get_uint(3, ByteOrder::Little).unwrap(), 0b110);
        assert_eq!(reader.get_uint(5, ByteOrder::Little).unwrap(), 0b10100);
        assert_eq!(reader.position_bits(), 8);
        assert_eq!(reader.get_uint(8, ByteOrder::Little).unwrap(), 0xFF);
        assert!(!reader.has_remaining());
    }

    #[test]
    fn uint_crossing_byte_boundary() {
        // 24-bit little-endian value 0x7F00FF laid out as FF 00 7F
        let mut reader = BitReader::new(&[0xFF, 0x00, 0x7F]);
        assert_eq!(reader.get_uint(24, ByteOrder::Little).unwrap(), 0x7F00FF);
    }

    #[test]
    fn underflow_leaves_state_untouched() {
        let mut reader = BitReader::new(&[0xAB]);
        assert!(matches!(
            reader.get_uint(16, ByteOrder::Little),
            Err(Error::Underflow {
                requested: 16,
                available: 8
            })
        ));
        assert_eq!(reader.position_bits(), 0);
        assert_eq!(reader.get_u8().unwrap(), 0xAB);
    }

    #[test]
    fn byte_ops_require_alignment() {
        let mut reader = BitReader::new(&[0xAB, 0xCD]);
        reader.get_uint(3, ByteOrder::Little).unwrap();
        assert!(matches!(reader.get_u8(), Err(Error::Misaligned { position: 3 })));
    }

    #[test]
    fn fallback_restores_bit_state() {
        let mut reader = BitReader::new(&[0xAB, 0xCD, 0xEF]);
        reader.get_uint(5, ByteOrder::Little).unwrap();
        reader.fallback();
        let before = reader.position_bits();
        reader.get_uint(13, ByteOrder::Little).unwrap();
        reader.restore();
        assert_eq!(reader.position_bits(), before);
        // the same read replays identically
        let a = reader.get_uint(11, ByteOrder::Little).unwrap();
        reader.set_position_bytes(0);
        reader.skip(5).unwrap();
        assert_eq!(reader.get_uint(11, ByteOrder::Little).unwrap(), a);
    }

    #[test]
    fn text_until_terminator() {
        let charset = encoding_rs::WINDOWS_1252;
        let buf = b"123ABC tail";
        let mut reader = BitReader::new(buf);
        assert_eq!(reader.get_text_until(b'C', false, charset).unwrap(), "123AB");
        assert_eq!(reader.position_bytes(), 5);
        let mut reader = BitReader::new(buf);
        assert_eq!(reader.get_text_until(b'C', true, charset).unwrap(), "123AB");
        assert_eq!(reader.position_bytes(), 6);
    }

    #[test]
    fn text_until_hits_buffer_end() {
        let charset = encoding_rs::WINDOWS_1252;
        let mut reader = BitReader::new(b"abc");
        assert_eq!(reader.get_text_until(0x00, true, charset).unwrap(), "abc");
        assert!(!reader.has_remaining());
    }

    #[test]
    fn writer_mirrors_reader() {
        let mut writer = BitWriter::new();
        writer.put_uint(0b110, 3, ByteOrder::Little);
        writer.put_uint(0x1FF, 9, ByteOrder::Little);
        writer.put_uint(0xABCD, 16, ByteOrder::Big);
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.get_uint(3, ByteOrder::Little).unwrap(), 0b110);
        assert_eq!(reader.get_uint(9, ByteOrder::Little).unwrap(), 0x1FF);
        assert_eq!(reader.get_uint(16, ByteOrder::Big).unwrap(), 0xABCD);
    }

    #[test]
    fn writer_spills_and_pads() {
        let mut writer = BitWriter::new();
        writer.put_uint(0b101, 3, ByteOrder::Little);
        writer.flush();
        assert_eq!(writer.bytes(), &[0b101]);

        let mut writer = BitWriter::new();
        writer.put_uint(u64::MAX, 64, ByteOrder::Little);
        writer.put_uint(1, 1, ByteOrder::Little);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[8], 1);
    }

    #[test]
    fn fixed_width_endianness() {
        let mut writer = BitWriter::new();
        writer.put_u32(0x0000_0123, ByteOrder::Big).unwrap();
        writer.put_u32(0x0000_0456, ByteOrder::Big).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0x00, 0x00, 0x01, 0x23, 0x00, 0x00, 0x04, 0x56]);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.get_u32(ByteOrder::Big).unwrap(), 0x123);
        assert_eq!(reader.get_u32(ByteOrder::Big).unwrap(), 0x456);
    }

    #[test]
    fn big_uint_roundtrip() {
        let value = BigUint::from(0x0123_4567_89AB_CDEFu64) << 16u8;
        let mut writer = BitWriter::new();
        writer.put_big_uint(&value, 80, ByteOrder::Big);
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.get_big_uint(80, ByteOrder::Big).unwrap(), value);
    }

    #[test]
    fn bits_sequence_reverse() {
        let seq = Bits::from_u64(0b1101, 4);
        assert_eq!(seq.reversed().to_u64(), 0b1011);
        let seq = Bits::from_u64(0x01, 16);
        assert_eq!(seq.reversed().to_u64(), 0x8000);
    }

    #[test]
    fn skip_advances_like_get_bits() {
        let mut reader = BitReader::new(&[0xAA; 10]);
        reader.skip(19).unwrap();
        assert_eq!(reader.position_bits(), 19);
        assert!(matches!(reader.skip(80), Err(Error::Underflow { .. })));
    }
}
