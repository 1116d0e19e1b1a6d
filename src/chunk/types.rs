//! Version markers, packing options and the typed value trait of the state
//! chunk buffer engine.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::common::types::{Guid, VxColor, VxMatrix, VxVector2, VxVector3};

/// Data layout revision of the values an object writes into its chunk.
///
/// Load overrides branch on this to keep reading historical layouts; save
/// always stamps [`DataVersion::CURRENT`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataVersion {
    Old = 0,
    Base = 1,
    MajorChange = 5,
    Dev2_1 = 10,
}

impl DataVersion {
    pub const CURRENT: DataVersion = DataVersion::Dev2_1;
}

/// Revision of the chunk container itself (identifier table and reference
/// list encoding), independent of the payload layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ChunkVersion {
    Base = 0,
    /// Object references become table indices when bound to a file.
    Version1 = 4,
    /// Adds the manager reference list.
    Version2 = 5,
    Version3 = 6,
    Version4 = 7,
}

impl ChunkVersion {
    pub const CURRENT: ChunkVersion = ChunkVersion::Version4;
}

bitflags! {
    /// Which optional sections follow the data region in the serialized
    /// container form.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ChunkOptions: u8 {
        /// Object reference offset list present.
        const IDS = 0x01;
        /// Manager reference offset list present.
        const MAN = 0x02;
        /// Embedded chunk offset list present.
        const CHN = 0x04;
        /// Chunk was produced bound to a file (object refs are indices).
        const FILE = 0x08;
    }
}

/// Mutually exclusive access modes of a chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChunkMode {
    Idle,
    Read,
    Write,
}

/// Diagnostic record for one identifier-tagged region.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IdentifierProfile {
    pub identifier: u32,
    /// Byte offset of the region payload inside the data buffer.
    pub byte_offset: u32,
    /// Payload size in bytes.
    pub byte_size: u32,
}

/// A value with a fixed little-endian byte image inside a chunk.
///
/// Every write is rounded up to a whole DWORD with zero fill; the image
/// itself is packed. Mirrors of the same encoding on the read side keep the
/// format independent of host endianness.
pub trait ChunkStruct: Sized {
    const BYTE_SIZE: usize;

    /// Encode into `out`, which is exactly `BYTE_SIZE` bytes.
    fn to_bytes(&self, out: &mut [u8]);

    /// Decode from `raw`, which is exactly `BYTE_SIZE` bytes.
    fn from_bytes(raw: &[u8]) -> Self;
}

macro_rules! chunk_struct_int {
    ($($ty:ty),+) => {
        $(impl ChunkStruct for $ty {
            const BYTE_SIZE: usize = std::mem::size_of::<$ty>();

            fn to_bytes(&self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn from_bytes(raw: &[u8]) -> Self {
                <$ty>::from_le_bytes(raw.try_into().expect("exact size"))
            }
        })+
    };
}

chunk_struct_int!(u8, i8, u16, i16, u32, i32, u64, i64, f32);

impl<const N: usize> ChunkStruct for [u8; N] {
    const BYTE_SIZE: usize = N;

    fn to_bytes(&self, out: &mut [u8]) {
        out.copy_from_slice(self);
    }

    fn from_bytes(raw: &[u8]) -> Self {
        raw.try_into().expect("exact size")
    }
}

impl ChunkStruct for Guid {
    const BYTE_SIZE: usize = 8;

    fn to_bytes(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.d1.to_le_bytes());
        out[4..8].copy_from_slice(&self.d2.to_le_bytes());
    }

    fn from_bytes(raw: &[u8]) -> Self {
        Guid {
            d1: u32::from_le_bytes(raw[0..4].try_into().expect("exact size")),
            d2: u32::from_le_bytes(raw[4..8].try_into().expect("exact size")),
        }
    }
}

impl ChunkStruct for VxVector2 {
    const BYTE_SIZE: usize = 8;

    fn to_bytes(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
    }

    fn from_bytes(raw: &[u8]) -> Self {
        VxVector2 {
            x: f32::from_le_bytes(raw[0..4].try_into().expect("exact size")),
            y: f32::from_le_bytes(raw[4..8].try_into().expect("exact size")),
        }
    }
}

impl ChunkStruct for VxVector3 {
    const BYTE_SIZE: usize = 12;

    fn to_bytes(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..8].copy_from_slice(&self.y.to_le_bytes());
        out[8..12].copy_from_slice(&self.z.to_le_bytes());
    }

    fn from_bytes(raw: &[u8]) -> Self {
        VxVector3 {
            x: f32::from_le_bytes(raw[0..4].try_into().expect("exact size")),
            y: f32::from_le_bytes(raw[4..8].try_into().expect("exact size")),
            z: f32::from_le_bytes(raw[8..12].try_into().expect("exact size")),
        }
    }
}

/// Colors travel packed as one ARGB8888 dword, like the reference format.
impl ChunkStruct for VxColor {
    const BYTE_SIZE: usize = 4;

    fn to_bytes(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_argb().to_le_bytes());
    }

    fn from_bytes(raw: &[u8]) -> Self {
        VxColor::from_argb(u32::from_le_bytes(raw.try_into().expect("exact size")))
    }
}

impl ChunkStruct for VxMatrix {
    const BYTE_SIZE: usize = 64;

    fn to_bytes(&self, out: &mut [u8]) {
        for (i, row) in self.m.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let at = (i * 4 + j) * 4;
                out[at..at + 4].copy_from_slice(&v.to_le_bytes());
            }
        }
    }

    fn from_bytes(raw: &[u8]) -> Self {
        let mut m = [[0.0f32; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                let at = (i * 4 + j) * 4;
                *v = f32::from_le_bytes(raw[at..at + 4].try_into().expect("exact size"));
            }
        }
        VxMatrix { m }
    }
}
