use axum::{
    Extension, Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, warn};

use beam_db::DbError;
use beam_db::models::AccountRow;
use beam_types::models::Snapshot;

use crate::error::ApiError;
use crate::session;
use crate::{AppState, with_db};

/// Multipart part that carries the payload.
const FILE_FIELD: &str = "file";

/// POST /set — leave a payload for the peer, replacing any earlier one.
///
/// Accepts `multipart/form-data` with a `file` part, or the raw bytes as the
/// request body. The peer gets a push once the payload is stored.
pub async fn set_payload(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
    request: Request,
) -> Result<Json<Snapshot>, ApiError> {
    let content = read_upload(request).await?;
    if content.is_empty() {
        return Err(ApiError::BadRequest("empty payload"));
    }
    if content.len() > state.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge);
    }

    let sender = account.id;
    let (peer, snapshot) = with_db(&state, move |db| {
        let peer = db.deposit(sender, &content).map_err(|e| match e {
            DbError::NotFound(_) => ApiError::Conflict("no connection"),
            other => other.into(),
        })?;
        let snapshot = session::snapshot(db, sender)?;
        Ok((peer, snapshot))
    })
    .await?;

    // Best effort; the deposit stands whatever happens to the push.
    let notifier = state.notifier.clone();
    tokio::spawn(async move { notifier.notify(peer).await });

    Ok(Json(snapshot))
}

/// GET /get — the payload the peer left, as raw bytes.
pub async fn get_payload(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
) -> Result<impl IntoResponse, ApiError> {
    let fetcher = account.id;
    let content = with_db(&state, move |db| {
        db.withdraw(fetcher).map_err(|e| match e {
            DbError::NotFound(_) => ApiError::NotFound("no payload available".into()),
            other => other.into(),
        })
    })
    .await?;

    debug!("Account {} fetched {} bytes", fetcher, content.len());
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        content,
    ))
}

/// POST /clear — acknowledge the peer's payload. Nothing to clear is fine.
pub async fn clear_payload(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
) -> Result<Json<Snapshot>, ApiError> {
    let fetcher = account.id;
    let snapshot = with_db(&state, move |db| {
        match db.clear(fetcher) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("Account {} had nothing to clear", fetcher),
            Err(e) => return Err(e.into()),
        }
        session::snapshot(db, fetcher).map_err(ApiError::from)
    })
    .await?;

    Ok(Json(snapshot))
}

async fn read_upload(request: Request) -> Result<Bytes, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        return Bytes::from_request(request, &())
            .await
            .map_err(|e| body_error(e.status()));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| body_error(e.status()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status()))?
    {
        if field.name() == Some(FILE_FIELD) {
            return field.bytes().await.map_err(|e| body_error(e.status()));
        }
    }

    Err(ApiError::BadRequest("failed to find file"))
}

fn body_error(status: StatusCode) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        warn!("Rejected upload body ({})", status);
        ApiError::BadRequest("failed to parse request")
    }
}
