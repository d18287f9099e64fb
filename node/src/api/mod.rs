//! # REST API
//!
//! The axum router in front of the ledger. Handlers share one [`AppState`]
//! and run ledger calls (sled, locks) on tokio's blocking pool.
//!
//! ## Endpoints
//!
//! | Method | Path                               | Auth   | Description                       |
//! |--------|------------------------------------|--------|-----------------------------------|
//! | GET    | `/health`                          | no     | Liveness probe                    |
//! | POST   | `/register`                        | no     | Create user + wallet, get a token |
//! | POST   | `/login`                           | no     | Exchange credentials for a token  |
//! | GET    | `/user-info`                       | bearer | Caller's email and name           |
//! | GET    | `/wallet`                          | bearer | Wallet number and balance         |
//! | POST   | `/wallet/deposit`                  | bearer | Credit the caller's wallet        |
//! | POST   | `/wallet/transfer`                 | bearer | Verify, then commit with a PIN    |
//! | GET    | `/wallet/transactions`             | bearer | History, `?type=incoming|outgoing`|
//! | GET    | `/wallet/transactions/:id`         | bearer | One transaction                   |
//! | POST   | `/chatbot`                         | bearer | Ask the trade advisor             |
//! | GET    | `/chatbot/sessions`                | bearer | Past conversations                |

mod auth;
mod chat;
mod error;
mod users;
mod wallet;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use afritrade_ledger::chat::ChatService;
use afritrade_ledger::{Bank, LedgerResult};

pub use auth::AuthUser;
pub use error::{ApiError, ApiResult};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub bank: Bank,
    pub chat: ChatService,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/user-info", get(users::user_info))
        .route("/wallet", get(wallet::wallet_info))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/transfer", post(wallet::transfer))
        .route("/wallet/transactions", get(wallet::transactions))
        .route("/wallet/transactions/:transaction_id", get(wallet::transaction_detail))
        .route("/chatbot", post(chat::ask))
        .route("/chatbot/sessions", get(chat::sessions))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Run a ledger call on the blocking pool.
///
/// Ledger operations hit sled and may wait on wallet locks, so they never
/// run on an async worker.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> LedgerResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            tracing::error!(error = %e, "ledger task failed");
            Err(ApiError::internal("ledger task failed"))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
