use std::fmt;

use crc::{Crc, CRC_16_IBM_3740, CRC_32_ISO_HDLC, CRC_8_SMBUS};

/// A checksum algorithm applied over `bytes[start..end]` with a caller
/// supplied start value.
pub trait Checksummer: fmt::Debug + Send + Sync {
    fn calculate(&self, bytes: &[u8], start: usize, end: usize, start_value: u64) -> u64;
}

/// CRC-16/CCITT-FALSE: poly 0x1021, no reflection, customary init 0xFFFF.
#[derive(Debug)]
pub struct Crc16Ccitt;

impl Checksummer for Crc16Ccitt {
    fn calculate(&self, bytes: &[u8], start: usize, end: usize, start_value: u64) -> u64 {
        let crc = Crc::<u16>::new(&CRC_16_IBM_3740);
        let mut digest = crc.digest_with_initial(start_value as u16);
        digest.update(&bytes[start..end]);
        u64::from(digest.finalize())
    }
}

#[derive(Debug)]
pub struct Crc32;

impl Checksummer for Crc32 {
    fn calculate(&self, bytes: &[u8], start: usize, end: usize, start_value: u64) -> u64 {
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC);
        let mut digest = crc.digest_with_initial(start_value as u32);
        digest.update(&bytes[start..end]);
        u64::from(digest.finalize())
    }
}

#[derive(Debug)]
pub struct Crc8;

impl Checksummer for Crc8 {
    fn calculate(&self, bytes: &[u8], start: usize, end: usize, start_value: u64) -> u64 {
        let crc = Crc::<u8>::new(&CRC_8_SMBUS);
        let mut digest = crc.digest_with_initial(start_value as u8);
        digest.update(&bytes[start..end]);
        u64::from(digest.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccitt_false_check_value() {
        // the catalogue check input
        let res = Crc16Ccitt.calculate(b"123456789", 0, 9, 0xFFFF);
        assert_eq!(res, 0x29B1);
    }

    #[test]
    fn crc32_check_value() {
        let res = Crc32.calculate(b"123456789", 0, 9, 0xFFFF_FFFF);
        assert_eq!(res, 0xCBF4_3926);
    }

    #[test]
    fn subrange_only() {
        let all = Crc16Ccitt.calculate(b"xx123456789yy", 2, 11, 0xFFFF);
        assert_eq!(all, 0x29B1);
    }
}
