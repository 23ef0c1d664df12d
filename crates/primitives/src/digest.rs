//! BLAKE2b-256 digests with 16-byte personalisation tags.

use blake2b_simd::Params as Blake2bParams;

/// Domain separator for the association-set content pointer.
pub const DS_ASP_SET_V1: &[u8; 16] = b"pool.asp.set.v1\0";
/// Domain separator for proving-artifact integrity digests.
pub const DS_ARTIFACT_V1: &[u8; 16] = b"pool.artifact.v1";

pub fn blake2b_256(personal: &[u8; 16], data: &[u8]) -> [u8; 32] {
    let hash = Blake2bParams::new().hash_length(32).personal(personal).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Streaming variant for large files.
pub fn blake2b_256_state(personal: &[u8; 16]) -> blake2b_simd::State {
    Blake2bParams::new().hash_length(32).personal(personal).to_state()
}

pub fn finalize_256(state: &blake2b_simd::State) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(state.finalize().as_bytes());
    out
}
