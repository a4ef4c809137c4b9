/// Number of leading zero hex characters a winning digest must carry.
pub const DIFFICULTY_PREFIX: &str = "000";

/// Proof recorded in the genesis block. Fixed by convention, not mined.
pub const GENESIS_PROOF: u64 = 100;

/// The genesis block's `previous_hash` is the bare number 1 — a sentinel,
/// not a digest of anything. It must serialize as a JSON number.
pub const GENESIS_PREV_HASH: u64 = 1;

pub const HASH_HEX_LEN: usize = 64;

/// How many proof candidates to try between polls of the cancellation flag.
pub const CANCEL_CHECK_STRIDE: u64 = 1024;
