//! Index key abstraction (spec.md §4.6 "KeyManager").
//!
//! The original implementation's `KeyManager` compares two serialized keys
//! by deserializing them through a `Schema`; this crate narrows that to a
//! single fixed-width key type, implemented for the common case of an
//! integer index key. A future multi-column key would implement this same
//! trait rather than change any B+-tree code.

pub trait IndexKey: Ord + Copy + std::fmt::Debug + Send + Sync + 'static {
    const ENCODED_SIZE: usize;

    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Self;
}

impl IndexKey for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Self {
        i32::from_le_bytes(bytes.try_into().unwrap())
    }
}
