//! Coordinate extraction from packed chunk positions.
//!
//! Layout (64 bits, MSB first):
//! `| reserved(1) | chunkY(9) | dimHigh(5) | guard(1) | chunkZ(21) | dimLow(5) | guard(1) | chunkX(21) |`
//!
//! Only `chunkX` and `chunkZ` are decoded. Everything else survives because
//! the full position is kept in the leaf filename.

const CHUNK_X_MASK: i64 = 0x1F_FFFF;
const CHUNK_Z_SHIFT: u32 = 27;
const CHUNK_Z_MASK: i64 = 0x1F_FFFF;
const SIGN_BIT_21: i64 = 0x10_0000;
const SIGN_EXTEND_21: i64 = !0x1F_FFFF;

fn sign_extend_21(raw: i64) -> i32 {
    let value = if raw & SIGN_BIT_21 != 0 {
        raw | SIGN_EXTEND_21
    } else {
        raw
    };
    value as i32
}

/// Signed 21-bit `chunkX` from bits 0-20.
pub fn extract_chunk_x(position: i64) -> i32 {
    sign_extend_21(position & CHUNK_X_MASK)
}

/// Signed 21-bit `chunkZ` from bits 27-47.
pub fn extract_chunk_z(position: i64) -> i32 {
    sign_extend_21((position >> CHUNK_Z_SHIFT) & CHUNK_Z_MASK)
}
