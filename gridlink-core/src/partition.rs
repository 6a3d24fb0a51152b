//! Key partitioning.
//!
//! The mapping from key bytes to partition id is a compatibility contract
//! with the cluster and must not change:
//!
//! - `hash = MurmurHash3_x86_32(key_bytes, seed = 0x01000193)`, read as `i32`
//! - `partition_id = if hash == i32::MIN { 0 } else { |hash| % partition_count }`
//! - the default partition count is 271; the actual count is announced by the
//!   cluster in the authentication response.
//!
//! The [`PartitionAware`] trait allows keys to declare a custom partition key
//! that differs from the key itself. This enables co-location of related entries
//! on the same partition.
//!
//! # Example
//!
//! ```
//! use gridlink_core::partition::{partition_id_for, PartitionAware, DEFAULT_PARTITION_COUNT};
//!
//! struct OrderKey {
//!     order_id: String,
//!     customer_id: String,
//! }
//!
//! impl PartitionAware for OrderKey {
//!     fn partition_key_bytes(&self) -> Vec<u8> {
//!         // Route all orders for the same customer to the same partition
//!         self.customer_id.as_bytes().to_vec()
//!     }
//! }
//!
//! let a = OrderKey { order_id: "1".into(), customer_id: "c-42".into() };
//! let b = OrderKey { order_id: "2".into(), customer_id: "c-42".into() };
//! assert_eq!(
//!     partition_id_for(&a.partition_key_bytes(), DEFAULT_PARTITION_COUNT),
//!     partition_id_for(&b.partition_key_bytes(), DEFAULT_PARTITION_COUNT),
//! );
//! ```

/// Seed of the partition hash.
pub const PARTITION_HASH_SEED: u32 = 0x01000193;

/// Partition count assumed until the cluster announces its own.
pub const DEFAULT_PARTITION_COUNT: i32 = 271;

/// Trait for keys that should be routed to a specific partition based on a
/// partition key different from the key itself.
///
/// When a type implementing this trait is used as a routing key, the partition
/// hash is computed from [`partition_key_bytes`](PartitionAware::partition_key_bytes)
/// instead of from the serialized key.
pub trait PartitionAware: Send + Sync {
    /// Returns the serialized bytes of the partition key.
    fn partition_key_bytes(&self) -> Vec<u8>;
}

impl PartitionAware for str {
    fn partition_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl PartitionAware for String {
    fn partition_key_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl PartitionAware for [u8] {
    fn partition_key_bytes(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl PartitionAware for Vec<u8> {
    fn partition_key_bytes(&self) -> Vec<u8> {
        self.clone()
    }
}

/// Computes the partition hash for the given key bytes.
pub fn partition_hash(key: &[u8]) -> i32 {
    murmur_hash3_x86_32(key, PARTITION_HASH_SEED)
}

/// Maps key bytes onto a partition in `0..partition_count`.
///
/// Returns 0 when `partition_count` is not positive.
pub fn partition_id_for(key: &[u8], partition_count: i32) -> i32 {
    partition_id_from_hash(partition_hash(key), partition_count)
}

/// Maps a precomputed partition hash onto a partition.
pub fn partition_id_from_hash(hash: i32, partition_count: i32) -> i32 {
    if partition_count <= 0 || hash == i32::MIN {
        return 0;
    }
    hash.abs() % partition_count
}

/// MurmurHash3 x86 32-bit implementation.
pub fn murmur_hash3_x86_32(data: &[u8], seed: u32) -> i32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    fn mix(k1: u32) -> u32 {
        k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
    }

    let len = data.len();
    let mut h1 = seed;

    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h1 ^= mix(k1);
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1: u32 = 0;
        for (i, byte) in tail.iter().enumerate() {
            k1 ^= (*byte as u32) << (8 * i);
        }
        h1 ^= mix(k1);
    }

    h1 ^= len as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;

    h1 as i32
}
