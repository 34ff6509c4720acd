use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::error::ApiError;
use crate::{AppState, with_db};

/// Resolve the `Authorization` header to an account.
///
/// The header carries the raw auth key handed out at registration, with or
/// without a `Bearer ` prefix. The account row is inserted as a request
/// extension for the handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_key = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let account = with_db(&state, move |db| {
        db.account_by_auth_key(&auth_key).map_err(|e| {
            if e.is_not_found() {
                ApiError::Unauthorized
            } else {
                e.into()
            }
        })
    })
    .await?;

    debug!("Request authenticated as account {}", account.id);
    req.extensions_mut().insert(account);
    Ok(next.run(req).await)
}
