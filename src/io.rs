//! Byte-level (de)serialization primitives.
//!
//! Grounded on the teacher's `Encodeable`/`Decodeable` pair (`io.rs`):
//! every on-disk structure writes itself as little-endian bytes through
//! these traits, with a 32-bit magic number leading every serialized form
//! per spec.md §4.5.

use std::convert::TryInto;
use std::io::Read;
use std::mem::size_of;

/// Serializes `self` into a growable byte buffer.
pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

/// Deserializes `Self` from a reader.
pub trait Decodeable: Sized {
    fn decode_from<R: Read>(reader: &mut R) -> Self;
}

pub fn read_exact<R: Read>(reader: &mut R, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    reader
        .read_exact(&mut buf)
        .unwrap_or_else(|e| panic!("io error reading {} bytes: {}", n, e));
    buf
}

macro_rules! impl_numeric {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }

            impl Decodeable for $t {
                fn decode_from<R: Read>(reader: &mut R) -> Self {
                    let bytes = read_exact(reader, size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    };
}

impl_numeric!(for u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Encodeable for bool {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decodeable for bool {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        u8::decode_from(reader) != 0
    }
}

/// A small append-only byte buffer used to build serialized records before
/// copying them into a page slot.
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, value: &T) -> &mut Self {
        self.buf.extend_from_slice(&value.encode());
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}
