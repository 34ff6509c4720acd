use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use beam_db::models::AccountRow;
use beam_types::api::{AccountResponse, SetPropsRequest};

use crate::error::ApiError;
use crate::{AppState, with_db};

/// POST /register — create an account. The response is the only time the
/// auth key leaves the server.
pub async fn register(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let account = with_db(&state, |db| {
        db.create_account(&mut rand::rng()).map_err(ApiError::from)
    })
    .await?;

    info!("Registered account {}", account.id);

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            account_id: account.id,
            connect_code: account.connect_code,
            auth_key: account.auth_key,
        }),
    ))
}

/// POST /props — update the device push token.
pub async fn set_props(
    State(state): State<AppState>,
    Extension(account): Extension<AccountRow>,
    Json(req): Json<SetPropsRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let id = account.id;
    let account = with_db(&state, move |db| {
        if let Some(token) = req.apns_token.as_deref() {
            db.set_push_token(id, Some(token))?;
        }
        db.account_by_id(id).map_err(ApiError::from)
    })
    .await?;

    Ok(Json(AccountResponse {
        account_id: account.id,
        connect_code: account.connect_code,
        auth_key: String::new(),
    }))
}
