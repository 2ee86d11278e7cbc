//! Key hashing for partition placement
//!
//! The cluster places keys with a 32-bit FNV-1 variant whose overflow
//! behaviour follows signed 64-bit arithmetic. Every client of the store
//! must reproduce it bit for bit or keys route to the wrong partitions.

const FNV_BASIS: i64 = 0x811C_9DC5;
const FNV_PRIME: i64 = 0x0100_0193;

/// Hash a key for ring placement.
///
/// Accumulates in signed 64-bit with wrapping multiplication, truncates
/// to signed 32-bit, then takes a saturating absolute value so that
/// `i32::MIN` maps to `i32::MAX` instead of overflowing.
pub fn fnv_hash(bytes: &[u8]) -> u32 {
    let mut acc = FNV_BASIS;
    for &b in bytes {
        acc = (acc ^ i64::from(b)).wrapping_mul(FNV_PRIME);
    }

    let truncated = acc as i32;
    if truncated == i32::MIN {
        i32::MAX as u32
    } else {
        truncated.unsigned_abs()
    }
}
