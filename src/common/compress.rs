//! Compression codec wrapped by the chunk buffer codec and the file layer.

use std::io::{Read, Write};

use crc::{Crc, CRC_32_ISO_HDLC};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Deflate `data` with the given zlib level (0-9).
pub fn pack(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    // Writing into a Vec cannot fail.
    encoder.write_all(data).expect("zlib encode into memory");
    encoder.finish().expect("zlib encode into memory")
}

/// Inflate `data`, which must expand to exactly `expected_size` bytes.
pub fn unpack(data: &[u8], expected_size: usize) -> Option<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected_size);
    decoder.read_to_end(&mut out).ok()?;
    if out.len() != expected_size {
        return None;
    }
    Some(out)
}

/// Rolling CRC-32 over the file header and both packed regions.
///
/// The reference exposes `Checksum(data, previous)`; an incremental digest is
/// the same operation without threading the intermediate value by hand.
pub struct FileChecksum {
    digest: crc::Digest<'static, u32>,
}

impl FileChecksum {
    pub fn new() -> Self {
        FileChecksum {
            digest: CRC32.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for FileChecksum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrip() {
        let data: Vec<u8> = (0..2048u32).map(|v| (v % 251) as u8).collect();
        let packed = pack(&data, 5);
        assert!(packed.len() < data.len());
        let unpacked = unpack(&packed, data.len()).expect("unpack");
        assert_eq!(unpacked, data);
    }

    #[test]
    fn unpack_rejects_wrong_size() {
        let packed = pack(b"four", 9);
        assert!(unpack(&packed, 5).is_none());
    }

    #[test]
    fn checksum_is_stable_over_split_input() {
        let mut whole = FileChecksum::new();
        whole.update(b"header and body");

        let mut split = FileChecksum::new();
        split.update(b"header ");
        split.update(b"and body");

        assert_eq!(whole.finalize(), split.finalize());
    }
}
