use crate::constants::{CANCEL_CHECK_STRIDE, DIFFICULTY_PREFIX};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Returns true iff sha256(block_bytes || decimal(proof)) renders to a hex
/// digest starting with [`DIFFICULTY_PREFIX`].
pub fn valid_proof(block_bytes: &[u8], proof: u64) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(block_bytes);
    hasher.update(proof.to_string().as_bytes());
    hex::encode(hasher.finalize()).starts_with(DIFFICULTY_PREFIX)
}

/// Sequential proof search starting at zero.
///
/// Polls `cancel` every [`CANCEL_CHECK_STRIDE`] candidates so a caller can
/// abandon the scan; returns `None` when cancelled, otherwise the first
/// proof for which [`valid_proof`] holds.
pub fn search(block_bytes: &[u8], cancel: &AtomicBool) -> Option<u64> {
    for proof in 0u64.. {
        if proof % CANCEL_CHECK_STRIDE == 0 && cancel.load(Ordering::Relaxed) {
            debug!(candidates_tried = proof, "proof search cancelled");
            return None;
        }
        if valid_proof(block_bytes, proof) {
            debug!(proof, "proof found");
            return Some(proof);
        }
    }
    None
}
