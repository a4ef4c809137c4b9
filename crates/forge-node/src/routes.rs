use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use forge_core::{canonical_bytes, pow, Ledger, Transaction};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    ledger: Arc<RwLock<Ledger>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger::new())),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mine", post(mine))
        .route("/transactions/new", post(new_transaction))
        .route("/chain", get(full_chain))
        .route("/last_block", get(last_block))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
pub struct MineRequest {
    pub id: Option<String>,
    pub proof: Option<u64>,
}

/// Checks a miner-supplied proof against the current last block and, if it
/// holds, forges the next block.
///
/// The proof check runs against a snapshot taken under the read lock; the
/// write lock is only taken for the append, after re-checking that the tip
/// has not moved since the snapshot.
async fn mine(
    State(state): State<AppState>,
    Json(req): Json<MineRequest>,
) -> (StatusCode, Json<Value>) {
    let (Some(id), Some(proof)) = (req.id, req.proof) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "id and proof are required" })),
        );
    };

    let (tip_index, tip_bytes) = {
        let ledger = state.ledger.read().await;
        let last = ledger.last_block();
        match canonical_bytes(last) {
            Ok(bytes) => (last.index, bytes),
            Err(err) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": err.to_string() })),
                )
            }
        }
    };

    if !pow::valid_proof(&tip_bytes, proof) {
        warn!(miner = %id, proof, "rejected invalid proof");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "invalid proof" })),
        );
    }

    let mut ledger = state.ledger.write().await;
    if ledger.last_block().index != tip_index {
        // Another miner forged a block between our snapshot and now; the
        // proof was checked against a block that is no longer the tip.
        warn!(miner = %id, tip_index, "chain advanced during validation");
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": "chain advanced, re-fetch the last block" })),
        );
    }

    match ledger.append_block(proof, None) {
        Ok(block) => {
            info!(miner = %id, index = block.index, "new block forged");
            (
                StatusCode::CREATED,
                Json(json!({ "message": "new block forged", "block": block })),
            )
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": err.to_string() })),
        ),
    }
}

#[derive(Deserialize)]
pub struct TxRequest {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<u64>,
}

async fn new_transaction(
    State(state): State<AppState>,
    Json(req): Json<TxRequest>,
) -> (StatusCode, Json<Value>) {
    let (Some(sender), Some(recipient), Some(amount)) = (req.sender, req.recipient, req.amount)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "sender, recipient and amount are required" })),
        );
    };

    let index = state.ledger.write().await.submit(Transaction {
        sender,
        recipient,
        amount,
    });
    (
        StatusCode::CREATED,
        Json(json!({
            "message": format!("transaction will be included in block {index}"),
            "index": index,
        })),
    )
}

async fn full_chain(State(state): State<AppState>) -> Json<Value> {
    let ledger = state.ledger.read().await;
    Json(json!({ "length": ledger.len(), "chain": ledger.chain() }))
}

async fn last_block(State(state): State<AppState>) -> Json<Value> {
    let ledger = state.ledger.read().await;
    Json(json!({ "last_block": ledger.last_block() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    async fn tip_bytes(state: &AppState) -> Vec<u8> {
        let ledger = state.ledger.read().await;
        canonical_bytes(ledger.last_block()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn mine_rejects_missing_fields() {
        let state = AppState::new();
        for req in [
            MineRequest { id: None, proof: Some(1) },
            MineRequest { id: Some("miner".into()), proof: None },
            MineRequest { id: None, proof: None },
        ] {
            let (status, Json(body)) = mine(State(state.clone()), Json(req)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["message"], "id and proof are required");
        }
        assert_eq!(state.ledger.read().await.len(), 1);
    }

    #[tokio::test]
    async fn mine_rejects_wrong_proof_without_mutating() {
        let state = AppState::new();
        state.ledger.write().await.submit(Transaction {
            sender: "a".into(),
            recipient: "b".into(),
            amount: 5,
        });

        let bytes = tip_bytes(&state).await;
        let bad_proof = (0u64..)
            .find(|p| !pow::valid_proof(&bytes, *p))
            .unwrap();

        let (status, Json(body)) = mine(
            State(state.clone()),
            Json(MineRequest {
                id: Some("miner".into()),
                proof: Some(bad_proof),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "invalid proof");
        let ledger = state.ledger.read().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[tokio::test]
    async fn mine_forges_a_block_with_a_valid_proof() {
        let state = AppState::new();
        let (status, Json(body)) = new_transaction(
            State(state.clone()),
            Json(TxRequest {
                sender: Some("a".into()),
                recipient: Some("b".into()),
                amount: Some(5),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["index"], 2);

        let bytes = tip_bytes(&state).await;
        let cancel = AtomicBool::new(false);
        let proof = pow::search(&bytes, &cancel).unwrap();

        let (status, Json(body)) = mine(
            State(state.clone()),
            Json(MineRequest {
                id: Some("miner".into()),
                proof: Some(proof),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "new block forged");
        assert_eq!(body["block"]["index"], 2);
        assert_eq!(body["block"]["transactions"][0]["sender"], "a");

        let ledger = state.ledger.read().await;
        assert_eq!(ledger.len(), 2);
        assert!(ledger.pending().is_empty());
    }

    #[tokio::test]
    async fn new_transaction_rejects_missing_fields() {
        let state = AppState::new();
        let (status, Json(body)) = new_transaction(
            State(state.clone()),
            Json(TxRequest {
                sender: Some("a".into()),
                recipient: None,
                amount: Some(5),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "sender, recipient and amount are required");
        assert!(state.ledger.read().await.pending().is_empty());
    }

    #[tokio::test]
    async fn full_chain_lists_every_block() {
        let state = AppState::new();
        state.ledger.write().await.append_block(7, None).unwrap();

        let Json(body) = full_chain(State(state.clone())).await;
        assert_eq!(body["length"], 2);
        assert_eq!(body["chain"].as_array().unwrap().len(), 2);
        assert_eq!(body["chain"][0]["previous_hash"], 1);
    }

    #[tokio::test]
    async fn last_block_returns_the_tip() {
        let state = AppState::new();
        let Json(body) = last_block(State(state.clone())).await;
        assert_eq!(body["last_block"]["index"], 1);

        state.ledger.write().await.append_block(7, None).unwrap();
        let Json(body) = last_block(State(state)).await;
        assert_eq!(body["last_block"]["index"], 2);
    }
}
