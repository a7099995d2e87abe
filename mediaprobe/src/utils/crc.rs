//! Table-driven CRC implementations.
//!
//! CRC-8 (poly 0x07, MSB first) protects FLAC frame headers. CRC-32
//! (reflected poly 0xEDB88320) protects PNG chunks. Tables are built at
//! compile time.

/// CRC algorithm specification with polynomial, initial value and final XOR.
pub struct Algorithm<T> {
    poly: T,
    init: T,
    xor_out: T,
}

/// CRC-8 algorithm for FLAC frame header validation.
pub const CRC_FLAC_FRAME_HEADER_ALG: Algorithm<u8> = Algorithm {
    poly: 0x07,
    init: 0x00,
    xor_out: 0x00,
};

/// CRC-32 algorithm for PNG chunk validation (reflected form of 0x04C11DB7).
pub const CRC_PNG_CHUNK_ALG: Algorithm<u32> = Algorithm {
    poly: 0xEDB8_8320,
    init: 0xFFFF_FFFF,
    xor_out: 0xFFFF_FFFF,
};

/// Shifts `len` bits of an MSB-first CRC-8 register.
#[inline(always)]
pub const fn crc8(poly: u8, mut value: u8, len: usize) -> u8 {
    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 7) & 1) * poly);
        i += 1;
    }

    value
}

/// Shifts `len` bits of an LSB-first (reflected) CRC-32 register.
#[inline(always)]
pub const fn crc32_reflected(poly: u32, mut value: u32, len: usize) -> u32 {
    let mut i = 0;
    while i < len {
        value = (value >> 1) ^ ((value & 1) * poly);
        i += 1;
    }

    value
}

const fn crc8_table(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc8(poly, i as u8, 8);
        i += 1;
    }

    table
}

const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32_reflected(poly, i as u32, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc8 {
    pub poly: u8,
    pub init: u8,
    xor_out: u8,
    table: [u8; 256],
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    xor_out: u32,
    table: [u32; 256],
}

impl Crc8 {
    pub const fn new(algorithm: &Algorithm<u8>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            xor_out: algorithm.xor_out,
            table: crc8_table(algorithm.poly),
        }
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u8, bytes: &[u8]) -> u8 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table[(crc ^ bytes[i]) as usize];
            i += 1;
        }

        crc
    }

    pub const fn checksum(&self, bytes: &[u8]) -> u8 {
        self.update(self.init, bytes) ^ self.xor_out
    }
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            xor_out: algorithm.xor_out,
            table: crc32_table(algorithm.poly),
        }
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table[((crc ^ bytes[i] as u32) & 0xFF) as usize] ^ (crc >> 8);
            i += 1;
        }

        crc
    }

    /// Finalized checksum of a single contiguous buffer.
    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.update(self.init, bytes) ^ self.xor_out
    }

    pub const fn finalize(&self, crc: u32) -> u32 {
        crc ^ self.xor_out
    }
}

/// Shared instance for FLAC frame headers.
pub static FLAC_FRAME_HEADER_CRC: Crc8 = Crc8::new(&CRC_FLAC_FRAME_HEADER_ALG);

/// Shared instance for PNG chunks.
pub static PNG_CHUNK_CRC: Crc32 = Crc32::new(&CRC_PNG_CHUNK_ALG);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_values() {
        assert_eq!(FLAC_FRAME_HEADER_CRC.checksum(b"123456789"), 0xF4);
        assert_eq!(PNG_CHUNK_CRC.checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn incremental_matches_whole() {
        let data = b"IHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x02\x00\x00\x00";
        let (head, tail) = data.split_at(4);
        let crc = PNG_CHUNK_CRC.update(PNG_CHUNK_CRC.init, head);
        let crc = PNG_CHUNK_CRC.update(crc, tail);
        assert_eq!(PNG_CHUNK_CRC.finalize(crc), PNG_CHUNK_CRC.checksum(data));
        assert_eq!(PNG_CHUNK_CRC.checksum(data), 0x9077_53DE);
    }
}
