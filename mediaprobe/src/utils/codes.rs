//! Integer codes shared by the format decoders.
//!
//! - Unary / Rice codes (FLAC residuals) with a table-driven run counter
//! - UTF-8-style variable-length integers (FLAC frame and sample numbers)
//! - BER/DER lengths (MXF KLV)
//! - MSB-first bitfield extraction and packing

use crate::utils::errors::CodecError;

/// Number of leading zero bits for every byte value (8 for zero).
pub const UNARY_TABLE: [u8; 256] = unary_table();

const fn unary_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = (i as u8).leading_zeros() as u8;
        i += 1;
    }

    table
}

/// Maps an unsigned zigzag value back to a signed integer.
#[inline(always)]
pub const fn zigzag_decode(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

#[inline(always)]
pub const fn zigzag_encode(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

/// Reads `width` bits (0..=64) starting `bit_offset` bits into `bytes`,
/// most significant bit first.
pub fn extract_bits(bytes: &[u8], bit_offset: usize, width: u32) -> Result<u64, CodecError> {
    check_bit_range(bytes, bit_offset, width)?;

    let mut value = 0u64;
    let mut pos = bit_offset;
    let mut remaining = width as usize;

    while remaining > 0 {
        let byte = bytes[pos >> 3];
        let avail = 8 - (pos & 7);
        let take = avail.min(remaining);
        let chunk = (byte as u64 >> (avail - take)) & ((1u64 << take) - 1);

        value = (value << take) | chunk;
        pos += take;
        remaining -= take;
    }

    Ok(value)
}

/// Writes the low `width` bits of `value` at `bit_offset`, most significant
/// bit first. Bits outside the field are left untouched.
pub fn pack_bits(
    bytes: &mut [u8],
    bit_offset: usize,
    width: u32,
    value: u64,
) -> Result<(), CodecError> {
    check_bit_range(bytes, bit_offset, width)?;

    let mut pos = bit_offset;
    let mut remaining = width as usize;

    while remaining > 0 {
        let avail = 8 - (pos & 7);
        let take = avail.min(remaining);
        let shift = avail - take;
        let mask = (((1u16 << take) - 1) as u8) << shift;
        let chunk = ((value >> (remaining - take)) as u8) << shift;

        bytes[pos >> 3] = (bytes[pos >> 3] & !mask) | (chunk & mask);
        pos += take;
        remaining -= take;
    }

    Ok(())
}

fn check_bit_range(bytes: &[u8], bit_offset: usize, width: u32) -> Result<(), CodecError> {
    let available = bytes.len() * 8;
    if width > 64 || bit_offset.saturating_add(width as usize) > available {
        return Err(CodecError::BitRangeOutOfBounds {
            offset: bit_offset,
            width,
            available,
        });
    }

    Ok(())
}

/// Widest Rice remainder that still yields a 32-bit value.
pub const MAX_RICE_PARAM: u32 = 31;

/// Bit cursor over a byte slice for unary and Rice codes.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, bit_pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.bit_pos
    }

    pub fn available(&self) -> usize {
        self.bytes.len() * 8 - self.bit_pos
    }

    pub fn read_bits(&mut self, width: u32) -> Result<u64, CodecError> {
        let value = extract_bits(self.bytes, self.bit_pos, width)?;
        self.bit_pos += width as usize;
        Ok(value)
    }

    /// 24 bits starting at the cursor, zero filled past the end.
    fn window(&self) -> u32 {
        let index = self.bit_pos >> 3;
        let mut window = 0u32;
        for i in 0..4 {
            let byte = self.bytes.get(index + i).copied().unwrap_or(0);
            window = (window << 8) | byte as u32;
        }

        (window << (self.bit_pos & 7)) >> 8
    }

    /// Counts a run of `run_bit` bits and consumes the terminating opposite
    /// bit.
    pub fn read_unary(&mut self, run_bit: bool) -> Result<u32, CodecError> {
        let mut run = 0u32;

        loop {
            let window = if run_bit {
                !self.window() & 0x00FF_FFFF
            } else {
                self.window()
            };

            let zeros = match ((window >> 16) as u8, (window >> 8) as u8, window as u8) {
                (hi, _, _) if hi != 0 => UNARY_TABLE[hi as usize] as usize,
                (_, mid, _) if mid != 0 => 8 + UNARY_TABLE[mid as usize] as usize,
                (_, _, lo) if lo != 0 => 16 + UNARY_TABLE[lo as usize] as usize,
                _ => 24,
            };

            if zeros < 24 {
                if zeros + 1 > self.available() {
                    return Err(self.truncated(zeros + 1));
                }
                self.bit_pos += zeros + 1;
                return Ok(run + zeros as u32);
            }

            if 24 > self.available() {
                return Err(self.truncated(25));
            }
            self.bit_pos += 24;
            run += 24;
        }
    }

    /// Rice code with parameter `param`: unary quotient (zeros ended by a
    /// one), `param` remainder bits, zigzag folded to a signed value.
    pub fn read_rice(&mut self, param: u32) -> Result<i32, CodecError> {
        if param > MAX_RICE_PARAM {
            return Err(CodecError::RiceParameterTooLarge(param));
        }

        let quotient = self.read_unary(false)?;
        if quotient > u32::MAX >> param {
            return Err(CodecError::ValueTooWide { max_bits: 32 });
        }
        let remainder = self.read_bits(param)? as u32;

        Ok(zigzag_decode((quotient << param) | remainder))
    }

    fn truncated(&self, needed_bits: usize) -> CodecError {
        CodecError::Truncated {
            needed: (self.bit_pos + needed_bits).div_ceil(8),
            available: self.bytes.len(),
        }
    }
}

/// Number of continuation bytes announced by a UTF-8-style leading byte.
pub const fn utf8_varint_len(first: u8) -> Result<usize, CodecError> {
    match first.leading_ones() {
        0 => Ok(0),
        n @ 2..=7 => Ok(n as usize - 1),
        _ => Err(CodecError::InvalidLeadingByte(first)),
    }
}

/// Decodes a UTF-8-style integer of at most `max_bits` bits from the start
/// of `bytes`. Returns the value and the number of bytes consumed.
pub fn decode_utf8_varint(bytes: &[u8], max_bits: u32) -> Result<(u64, usize), CodecError> {
    let Some(&first) = bytes.first() else {
        return Err(CodecError::Truncated {
            needed: 1,
            available: 0,
        });
    };

    let continuation = utf8_varint_len(first)?;
    if bytes.len() < continuation + 1 {
        return Err(CodecError::Truncated {
            needed: continuation + 1,
            available: bytes.len(),
        });
    }

    let lead_bits = if continuation == 0 { 7 } else { 6 - continuation as u32 };
    let mut value = (first as u64) & ((1u64 << lead_bits) - 1);

    for (index, &byte) in bytes[1..=continuation].iter().enumerate() {
        if byte & 0xC0 != 0x80 {
            return Err(CodecError::InvalidContinuation {
                index: index + 1,
                byte,
            });
        }
        value = (value << 6) | (byte & 0x3F) as u64;
    }

    if max_bits < 64 && value >> max_bits != 0 {
        return Err(CodecError::ValueTooWide { max_bits });
    }

    Ok((value, continuation + 1))
}

/// Encodes `value` (at most 36 bits) in the shortest UTF-8-style form.
pub fn encode_utf8_varint(value: u64) -> Result<Vec<u8>, CodecError> {
    if value < 0x80 {
        return Ok(vec![value as u8]);
    }

    let continuation = (1..=6usize)
        .find(|&n| {
            let bits = 6 * n as u32 + (6 - n as u32);
            value >> bits == 0
        })
        .ok_or(CodecError::ValueTooWide { max_bits: 36 })?;

    let mut out = Vec::with_capacity(continuation + 1);
    let prefix = !(0xFFu8 >> (continuation + 1));
    out.push(prefix | (value >> (6 * continuation)) as u8);
    for i in (0..continuation).rev() {
        out.push(0x80 | ((value >> (6 * i)) & 0x3F) as u8);
    }

    Ok(out)
}

/// Decodes a BER/DER length. Returns the length and the bytes consumed.
pub fn decode_ber_length(bytes: &[u8]) -> Result<(u64, usize), CodecError> {
    let Some(&first) = bytes.first() else {
        return Err(CodecError::Truncated {
            needed: 1,
            available: 0,
        });
    };

    if first & 0x80 == 0 {
        return Ok((first as u64, 1));
    }

    let count = first & 0x7F;
    match count {
        0 => return Err(CodecError::IndefiniteLength),
        9..=0x7F => return Err(CodecError::LengthTooLong(count)),
        _ => {}
    }

    let count = count as usize;
    if bytes.len() < count + 1 {
        return Err(CodecError::Truncated {
            needed: count + 1,
            available: bytes.len(),
        });
    }

    let length = bytes[1..=count]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);

    Ok((length, count + 1))
}

/// Minimal BER encoding of `length`.
pub fn encode_ber_length(length: u64) -> Vec<u8> {
    if length < 0x80 {
        return vec![length as u8];
    }

    let count = 8 - (length.leading_zeros() / 8) as usize;
    let mut out = Vec::with_capacity(count + 1);
    out.push(0x80 | count as u8);
    out.extend_from_slice(&length.to_be_bytes()[8 - count..]);

    out
}
