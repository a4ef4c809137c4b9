use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

pub mod constants;
pub mod pow;

use constants::{GENESIS_PREV_HASH, GENESIS_PROOF};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("canonical encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
}

/// Link to the preceding block: either a real hex digest or, for the genesis
/// block only, the bare-number sentinel `1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrevHash {
    Sentinel(u64),
    Hash(String),
}

impl PrevHash {
    pub fn genesis() -> Self {
        PrevHash::Sentinel(GENESIS_PREV_HASH)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: PrevHash,
}

/// Serializes a block to compact JSON with lexicographically sorted keys.
///
/// Goes through `serde_json::Value`, whose object map is a BTreeMap, so two
/// logically identical blocks encode to identical bytes no matter how their
/// fields were populated.
pub fn canonical_bytes(block: &Block) -> Result<Vec<u8>, CoreError> {
    let value = serde_json::to_value(block)?;
    Ok(serde_json::to_vec(&value)?)
}

/// SHA-256 of the canonical encoding, rendered as 64 lowercase hex chars.
pub fn block_hash(block: &Block) -> Result<String, CoreError> {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(block)?);
    Ok(hex::encode(hasher.finalize()))
}

fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs_f64()
}

/// Append-only chain plus the pool of transactions waiting for the next
/// block. One value owns both so `append_block` can snapshot-and-clear the
/// pool atomically with the append.
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl Ledger {
    /// Seeds the genesis block, so the chain is never observed empty.
    pub fn new() -> Self {
        let genesis = Block {
            index: 1,
            timestamp: unix_time_secs(),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: PrevHash::genesis(),
        };
        Self {
            chain: vec![genesis],
            pending: Vec::new(),
        }
    }

    /// Queues a transaction, unvalidated, and returns the index of the block
    /// it is slated for. Later submissions may land in the same block.
    pub fn submit(&mut self, tx: Transaction) -> u64 {
        self.pending.push(tx);
        let target = self.last_block().index + 1;
        debug!(
            target_index = target,
            pending = self.pending.len(),
            "transaction queued"
        );
        target
    }

    /// Builds and appends the next block, draining the pending pool into it.
    ///
    /// `previous_hash` defaults to the hash of the current last block. The
    /// proof is recorded as given; checking it against the previous block is
    /// the caller's job, before calling this.
    pub fn append_block(
        &mut self,
        proof: u64,
        previous_hash: Option<String>,
    ) -> Result<Block, CoreError> {
        let previous_hash = match previous_hash {
            Some(hash) => PrevHash::Hash(hash),
            None => PrevHash::Hash(block_hash(self.last_block())?),
        };
        let block = Block {
            index: self.chain.len() as u64 + 1,
            timestamp: unix_time_secs(),
            transactions: std::mem::take(&mut self.pending),
            proof,
            previous_hash,
        };
        info!(
            index = block.index,
            transactions = block.transactions.len(),
            "block appended"
        );
        self.chain.push(block.clone());
        Ok(block)
    }

    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger always holds at least the genesis block")
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
