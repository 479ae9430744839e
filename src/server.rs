//! HTTP surface of the verification service.
//!
//! | Method | Path                | Description                              |
//! |--------|---------------------|------------------------------------------|
//! | POST   | `/verify`           | Verify a payment and credit its units    |
//! | GET    | `/balance/:address` | Units held by an address (0 if unknown)  |
//! | GET    | `/bundles`          | Bundle catalog                           |
//! | GET    | `/health`           | Liveness probe                           |

use crate::catalog::Bundle;
use crate::ledger::{Address, Signature};
use crate::payment::{PaymentVerifier, VerificationError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The verification core.
    pub verifier: Arc<PaymentVerifier>,
}

/// Build the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/verify", post(verify_handler))
        .route("/balance/:address", get(balance_handler))
        .route("/bundles", get(bundles_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of `POST /verify`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Paying account.
    pub wallet: String,
    /// Transaction signature.
    pub signature: String,
    /// Bundle id.
    pub tier: String,
}

/// Successful `POST /verify` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Units credited for the signature.
    pub credited: u64,
}

/// Response payload for `GET /balance/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Queried address.
    pub address: String,
    /// Units held.
    pub balance: u64,
}

/// One entry of `GET /bundles`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BundleResponse {
    /// Bundle id.
    pub id: String,
    /// Units credited.
    pub units: u64,
    /// Price in lamports.
    pub price_lamports: u64,
    /// Price in SOL.
    pub price_sol: String,
    /// Display label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_label: Option<String>,
}

impl From<&Bundle> for BundleResponse {
    fn from(bundle: &Bundle) -> Self {
        Self {
            id: bundle.id.clone(),
            units: bundle.units,
            price_lamports: bundle.price_lamports,
            price_sol: bundle.price_sol(),
            discount_label: bundle.discount_label.clone(),
        }
    }
}

/// Response payload for `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Signatures credited so far.
    pub processed: usize,
    /// Verify calls answered from the replay cache.
    pub cache_hits: u64,
    /// Verify calls that missed the replay cache.
    pub cache_misses: u64,
}

/// Error body `{error, kind}` with its status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn malformed(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "malformed_request",
            message: message.into(),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(error: VerificationError) -> Self {
        let status = match &error {
            VerificationError::UnknownBundle(_) => StatusCode::BAD_REQUEST,
            VerificationError::NotFound(_) => StatusCode::NOT_FOUND,
            VerificationError::OnChainError(_) | VerificationError::MismatchedTransaction(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            VerificationError::Ledger(_) => StatusCode::BAD_GATEWAY,
            VerificationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "kind": self.kind,
        });
        (self.status, Json(body)).into_response()
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.verifier.cache_stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        processed: state.verifier.processed_count(),
        cache_hits: cache.hits,
        cache_misses: cache.misses,
    })
}

async fn verify_handler(
    State(state): State<AppState>,
    request: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::malformed(e.body_text()))?;

    let wallet: Address = request
        .wallet
        .parse()
        .map_err(|e| ApiError::malformed(format!("invalid wallet: {e}")))?;
    let signature: Signature = request
        .signature
        .parse()
        .map_err(|e| ApiError::malformed(format!("invalid signature: {e}")))?;

    let credit = state
        .verifier
        .verify(&wallet, &signature, &request.tier)
        .await?;

    Ok(Json(VerifyResponse {
        credited: credit.units_credited,
    }))
}

async fn balance_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let parsed: Address = address
        .parse()
        .map_err(|e| ApiError::malformed(format!("invalid address: {e}")))?;
    let balance = state.verifier.balance(&parsed)?;
    Ok(Json(BalanceResponse { address, balance }))
}

async fn bundles_handler(State(state): State<AppState>) -> Json<Vec<BundleResponse>> {
    Json(
        state
            .verifier
            .catalog()
            .bundles()
            .iter()
            .map(BundleResponse::from)
            .collect(),
    )
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::ledger::{
        Checkpoint, InMemoryLedger, LedgerError, LedgerRpc, LedgerTransaction, SignatureStatus,
        SignedTransaction, Transfer,
    };
    use crate::payment::PaymentVerifierConfig;
    use crate::store::CreditStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Fixture {
        router: Router,
        ledger: Arc<InMemoryLedger>,
        payer: Address,
        treasury: Address,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let treasury = Address::from_bytes([0xAA; 32]);
        let verifier = PaymentVerifier::new(
            PaymentVerifierConfig {
                treasury: treasury.clone(),
                cache_capacity: 16,
            },
            Arc::new(Catalog::default()),
            ledger.clone(),
            CreditStore::open_temporary().expect("store"),
        );
        Fixture {
            router: create_router(AppState {
                verifier: Arc::new(verifier),
            }),
            ledger,
            payer: Address::from_bytes([0x01; 32]),
            treasury,
        }
    }

    fn land(fx: &Fixture, seed: u8, lamports: u64) -> Signature {
        let signature = Signature::from_bytes([seed; 64]);
        fx.ledger.insert_transaction(LedgerTransaction {
            signature: signature.clone(),
            success: true,
            transfer: Some(Transfer {
                sender: fx.payer.clone(),
                recipient: fx.treasury.clone(),
                lamports,
            }),
        });
        signature
    }

    struct DownLedger;

    #[async_trait]
    impl LedgerRpc for DownLedger {
        async fn get_balance(&self, _: &Address) -> Result<u64, LedgerError> {
            Err(LedgerError::Transport("down".to_string()))
        }
        async fn latest_checkpoint(&self) -> Result<Checkpoint, LedgerError> {
            Err(LedgerError::Transport("down".to_string()))
        }
        async fn submit_transaction(
            &self,
            _: &SignedTransaction,
        ) -> Result<Signature, LedgerError> {
            Err(LedgerError::Transport("down".to_string()))
        }
        async fn signature_statuses(
            &self,
            _: &[Signature],
        ) -> Result<Vec<Option<SignatureStatus>>, LedgerError> {
            Err(LedgerError::Transport("down".to_string()))
        }
        async fn get_transaction(
            &self,
            _: &Signature,
        ) -> Result<Option<LedgerTransaction>, LedgerError> {
            Err(LedgerError::Transport("down".to_string()))
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("request");
        send(router, request).await
    }

    async fn post_verify(router: &Router, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/verify")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        send(router, request).await
    }

    #[tokio::test]
    async fn test_health() {
        let fx = fixture();
        let (status, body) = get(&fx.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["processed"], 0);
        assert_eq!(body["cache_hits"], 0);
    }

    #[tokio::test]
    async fn test_health_reports_replay_cache() {
        let fx = fixture();
        let signature = land(&fx, 4, 70_000_000);
        let request = json!({"wallet": fx.payer, "signature": signature, "tier": "single"});

        assert_eq!(post_verify(&fx.router, &request).await.0, StatusCode::OK);
        assert_eq!(post_verify(&fx.router, &request).await.0, StatusCode::OK);

        let (_, body) = get(&fx.router, "/health").await;
        assert_eq!(body["processed"], 1);
        assert_eq!(body["cache_misses"], 1);
        assert_eq!(body["cache_hits"], 1);
    }

    #[tokio::test]
    async fn test_bundles_lists_catalog() {
        let fx = fixture();
        let (status, body) = get(&fx.router, "/bundles").await;
        assert_eq!(status, StatusCode::OK);
        let bundles = body.as_array().expect("array");
        assert_eq!(bundles.len(), 3);
        assert_eq!(bundles[1]["id"], "triple");
        assert_eq!(bundles[1]["price_sol"], "0.18");
        assert_eq!(bundles[1]["discount_label"], "Save 14%");
        assert!(bundles[0].get("discount_label").is_none());
    }

    #[tokio::test]
    async fn test_verify_then_replay() {
        let fx = fixture();
        let sig = land(&fx, 1, 180_000_000);
        let body = json!({"wallet": fx.payer, "signature": sig, "tier": "triple"});

        let (status, first) = post_verify(&fx.router, &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, json!({"credited": 3}));

        let (status, second) = post_verify(&fx.router, &body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second, json!({"credited": 3}));

        let (status, balance) = get(&fx.router, &format!("/balance/{}", fx.payer)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(balance["balance"], 3);
        assert_eq!(balance["address"], fx.payer.as_str());
    }

    #[tokio::test]
    async fn test_verify_error_statuses() {
        let fx = fixture();
        let wrong_amount = land(&fx, 2, 1);
        let unknown = Signature::from_bytes([3u8; 64]);

        let cases = [
            (
                json!({"wallet": fx.payer, "signature": unknown, "tier": "triple"}),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                json!({"wallet": fx.payer, "signature": wrong_amount, "tier": "triple"}),
                StatusCode::UNPROCESSABLE_ENTITY,
                "mismatched_transaction",
            ),
            (
                json!({"wallet": fx.payer, "signature": wrong_amount, "tier": "gold"}),
                StatusCode::BAD_REQUEST,
                "unknown_bundle",
            ),
            (
                json!({"wallet": "0OIl", "signature": wrong_amount, "tier": "triple"}),
                StatusCode::BAD_REQUEST,
                "malformed_request",
            ),
            (
                json!({"wallet": fx.payer}),
                StatusCode::BAD_REQUEST,
                "malformed_request",
            ),
        ];

        for (body, expected_status, expected_kind) in cases {
            let (status, response) = post_verify(&fx.router, &body).await;
            assert_eq!(status, expected_status, "{body}");
            assert_eq!(response["kind"], expected_kind, "{body}");
            assert!(response["error"].is_string());
        }

        let (_, balance) = get(&fx.router, &format!("/balance/{}", fx.payer)).await;
        assert_eq!(balance["balance"], 0);
    }

    #[tokio::test]
    async fn test_ledger_outage_is_bad_gateway() {
        let fx = fixture();
        let sig = Signature::from_bytes([4u8; 64]);

        let verifier = PaymentVerifier::new(
            PaymentVerifierConfig {
                treasury: fx.treasury.clone(),
                cache_capacity: 16,
            },
            Arc::new(Catalog::default()),
            Arc::new(DownLedger),
            CreditStore::open_temporary().expect("store"),
        );
        let router = create_router(AppState {
            verifier: Arc::new(verifier),
        });

        let (status, body) = post_verify(
            &router,
            &json!({"wallet": fx.payer, "signature": sig, "tier": "single"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "ledger_unavailable");
    }

    #[tokio::test]
    async fn test_balance_of_unknown_and_malformed_address() {
        let fx = fixture();
        let stranger = Address::from_bytes([0x55; 32]);

        let (status, body) = get(&fx.router, &format!("/balance/{stranger}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 0);

        let (status, body) = get(&fx.router, "/balance/not-base58!").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "malformed_request");
    }
}
