//! Wallet, deposit, transfer, and history handlers.

use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use afritrade_ledger::identity::{UserDirectory, UserId};
use afritrade_ledger::transaction::{Direction, Transaction};
use afritrade_ledger::transfer::{IdempotencyKey, TransferRequest, TransferStep};
use afritrade_ledger::vault::{Amount, WalletNumber};
use afritrade_ledger::{LedgerError, LedgerResult};

use super::{blocking, ApiError, ApiResult, AppState, AuthUser};

/// Shown when a participant's account no longer resolves.
const UNKNOWN_NAME: &str = "Unknown";

// ---------------------------------------------------------------------------
// Wire Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub wallet_number: WalletNumber,
    pub balance: Amount,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositResponse {
    pub message: String,
    pub balance: Amount,
}

/// Body of `POST /wallet/transfer`. The same shape serves both steps; the
/// commit step resends everything the verify step saw.
#[derive(Debug, Deserialize)]
pub struct TransferBody {
    #[serde(default)]
    pub step: TransferStep,
    pub recipient_wallet_number: WalletNumber,
    pub amount: Amount,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransferResponse {
    Committed(TransferCommitted),
    Verified(TransferVerified),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferVerified {
    pub recipient_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferCommitted {
    pub message: String,
    pub balance: Amount,
    pub recipient_name: String,
    pub transaction_id: Uuid,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type", default)]
    pub direction: Option<String>,
}

/// One history row as the caller sees it.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub transaction_id: Uuid,
    pub sender_name: String,
    /// The receiver's current name.
    pub receiver_name_display: String,
    pub amount: Amount,
    /// The receiver's name when the transfer committed.
    pub receiver_name: String,
    pub receiver_account_number: WalletNumber,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub transaction_direction: Direction,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /wallet`
pub async fn wallet_info(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<WalletResponse>> {
    let wallets = state.bank.wallets.clone();
    let wallet = blocking(move || wallets.get_wallet(user)).await?;
    Ok(Json(WalletResponse {
        wallet_number: wallet.number,
        balance: wallet.balance,
    }))
}

/// `POST /wallet/deposit`
pub async fn deposit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> ApiResult<Json<DepositResponse>> {
    let Json(request) = payload?;
    let wallets = state.bank.wallets.clone();
    let balance = match blocking(move || wallets.deposit(user, request.amount)).await {
        Ok(balance) => balance,
        Err(e) => {
            if e.is_busy() {
                state.metrics.busy_rejections_total.inc();
            }
            return Err(e);
        }
    };

    state.metrics.deposits_total.inc();
    Ok(Json(DepositResponse {
        message: "Deposit successful".into(),
        balance,
    }))
}

/// `POST /wallet/transfer`
///
/// `step: "verify"` (the default) resolves the recipient and moves nothing.
/// `step: "transfer"` checks the PIN and commits.
pub async fn transfer(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<TransferBody>, JsonRejection>,
) -> ApiResult<Json<TransferResponse>> {
    let Json(body) = payload?;
    let engine = state.bank.transfers.clone();

    match body.step {
        TransferStep::Verify => {
            let (recipient, amount) = (body.recipient_wallet_number, body.amount);
            let verification = blocking(move || engine.verify(user, recipient, amount)).await?;
            state.metrics.verifications_total.inc();
            Ok(Json(TransferResponse::Verified(TransferVerified {
                recipient_name: verification.recipient_name,
            })))
        }
        TransferStep::Transfer => {
            let mut request = TransferRequest::new(body.recipient_wallet_number, body.amount);
            request.description = body.description;
            request.pin = body.pin;
            request.idempotency_key = body.idempotency_key;

            let timer = state.metrics.transfer_latency_seconds.start_timer();
            let result = tokio::task::spawn_blocking(move || engine.transfer(user, request)).await;
            timer.observe_duration();

            let receipt = match result {
                Ok(Ok(receipt)) => receipt,
                Ok(Err(e)) => {
                    state.metrics.record_rejection(e.kind());
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::error!(error = %e, "transfer task failed");
                    return Err(ApiError::internal("transfer task failed"));
                }
            };

            if receipt.replayed {
                state.metrics.transfers_replayed_total.inc();
            } else {
                state.metrics.transfers_committed_total.inc();
            }
            let tx = receipt.transaction;
            Ok(Json(TransferResponse::Committed(TransferCommitted {
                message: "Transfer successful".into(),
                balance: receipt.balance,
                recipient_name: tx.receiver_name,
                transaction_id: tx.id,
                amount: tx.amount,
                timestamp: tx.created_at,
                replayed: receipt.replayed,
            })))
        }
    }
}

/// `GET /wallet/transactions?type=incoming|outgoing`
pub async fn transactions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<TransactionSummary>>> {
    let Query(query) = query?;
    let direction = match query.direction.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<Direction>()?),
    };

    let bank = state.bank.clone();
    let summaries = blocking(move || {
        let mut names = NameCache::new(&bank.users);
        bank.history
            .list_for(user, direction)
            .map(|tx| summarize(&tx?, user, &mut names))
            .collect::<LedgerResult<Vec<_>>>()
    })
    .await?;
    Ok(Json(summaries))
}

/// `GET /wallet/transactions/:transaction_id`
pub async fn transaction_detail(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<TransactionSummary>> {
    let Path(id) = id?;
    let bank = state.bank.clone();
    let summary = blocking(move || {
        let tx = bank.history.get_by_id(user, id)?;
        summarize(&tx, user, &mut NameCache::new(&bank.users))
    })
    .await?;
    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Memoized display names for one history listing.
struct NameCache<'a> {
    users: &'a UserDirectory,
    names: HashMap<UserId, String>,
}

impl<'a> NameCache<'a> {
    fn new(users: &'a UserDirectory) -> Self {
        Self {
            users,
            names: HashMap::new(),
        }
    }

    fn name(&mut self, id: UserId) -> LedgerResult<String> {
        if let Some(name) = self.names.get(&id) {
            return Ok(name.clone());
        }
        let name = match self.users.user(id) {
            Ok(user) => user.full_name,
            Err(LedgerError::UserNotFound(_)) => UNKNOWN_NAME.to_string(),
            Err(e) => return Err(e),
        };
        self.names.insert(id, name.clone());
        Ok(name)
    }
}

fn summarize(tx: &Transaction, viewer: UserId, names: &mut NameCache<'_>) -> LedgerResult<TransactionSummary> {
    let direction = tx
        .direction_for(viewer)
        .ok_or(LedgerError::TransactionNotFound(tx.id))?;
    Ok(TransactionSummary {
        transaction_id: tx.id,
        sender_name: names.name(tx.sender)?,
        receiver_name_display: names.name(tx.receiver)?,
        amount: tx.amount,
        receiver_name: tx.receiver_name.clone(),
        receiver_account_number: tx.receiver_account_number,
        description: tx.description.clone(),
        timestamp: tx.created_at,
        transaction_direction: direction,
    })
}
