use axum::{Extension, Json, extract::State};
use tracing::{debug, info};

use beam_db::code::ConnectCode;
use beam_db::models::{AccountRow, Probe};
use beam_types::api::{AcceptRequest, ConnectRequest};
use beam_types::models::Snapshot;

use crate::error::ApiError;
use crate::session;
use crate::{AppState, with_db};

/// POST /connect — ask the owner of a connect code to pair.
///
/// Leaves whatever the caller was paired with. Unknown and malformed codes
/// are both "invalid code".
pub async fn connect(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<Snapshot>, ApiError> {
    let code = ConnectCode::parse(&req.connect_code).ok_or(ApiError::BadRequest("invalid code"))?;
    let caller = account.id;

    let snapshot = with_db(&state, move |db| {
        let invitee = db.account_by_connect_code(&code).map_err(|e| {
            if e.is_not_found() {
                ApiError::BadRequest("invalid code")
            } else {
                e.into()
            }
        })?;
        if invitee.id == caller {
            return Err(ApiError::BadRequest("cannot connect to yourself"));
        }

        let connection = db.request_link(caller, invitee.id)?;
        // Fresh request, nothing can be in its mailbox yet.
        Ok(session::describe(&connection, caller, Probe::default()))
    })
    .await?;

    info!("Account {} requested link with {}", caller, snapshot.peer_id);
    Ok(Json(snapshot))
}

/// POST /accept — accept (or, with `accept: false`, decline) a pending
/// request from `peerId`.
pub async fn accept(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<Snapshot>, ApiError> {
    let caller = account.id;
    let (peer, accepted) = (req.peer_id, req.accept);

    let snapshot = with_db(&state, move |db| {
        if !accepted {
            db.reject_link(caller, peer)
                .map_err(|e| no_request(e, "no such request to decline"))?;
            return session::snapshot(db, caller).map_err(ApiError::from);
        }

        let connection = db
            .accept_link(caller, peer)
            .map_err(|e| no_request(e, "failed to accept"))?;
        // Deposits need a live connection, so the mailbox is still empty.
        Ok(session::describe(&connection, caller, Probe::default()))
    })
    .await?;

    if accepted {
        info!("Account {} accepted link from {}", caller, peer);
    } else {
        debug!("Account {} declined link from {}", caller, peer);
    }
    Ok(Json(snapshot))
}

/// POST /disconnect — leave the current relationship, if any.
pub async fn disconnect(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
) -> Result<Json<Snapshot>, ApiError> {
    let caller = account.id;
    let left = with_db(&state, move |db| db.unlink_all(caller).map_err(ApiError::from)).await?;

    if left > 0 {
        info!("Account {} disconnected", caller);
    }
    Ok(Json(Snapshot::unlinked()))
}

/// GET /query — current pairing status and unread flags.
///
/// A request from someone else stays hidden while the caller has a live pair;
/// it can still be accepted by peer id.
pub async fn query(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
) -> Result<Json<Snapshot>, ApiError> {
    let caller = account.id;
    let snapshot =
        with_db(&state, move |db| session::snapshot(db, caller).map_err(ApiError::from)).await?;
    Ok(Json(snapshot))
}

/// A missing or mismatched request is a rejected action, not a missing resource.
fn no_request(e: beam_db::DbError, reason: &'static str) -> ApiError {
    if e.is_unavailable() {
        e.into()
    } else {
        ApiError::Conflict(reason)
    }
}
