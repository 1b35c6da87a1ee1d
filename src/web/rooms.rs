use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::{debug_handler, Form, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::db::{self, Room};
use crate::model::is_ident;
use crate::webhook::notify_best_effort;

#[derive(Debug, Deserialize)]
pub struct NewRoomForm {
    pub room_id: String,
    pub webhook_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RoomForm {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthForm {
    pub room_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UserAddForm {
    pub room_id: String,
    pub token: String,
    pub slack_id: String,
    pub atcoder_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UserDelForm {
    pub room_id: String,
    pub token: String,
    pub slack_id: String,
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Resolve `(room_id, token)` to a room, activating it on first use.
async fn authorize(state: &AppState, room_id: &str, token: &str) -> ApiResult<Room> {
    let Some(room) = db::authenticate(&state.pool, room_id, token).await? else {
        return Err(ApiError::Forbidden);
    };
    if !room.activated && db::activate_room(&state.pool, room_id).await? {
        info!(room_id, "room activated");
        notify_best_effort(state.notifier.as_ref(), &room.webhook_url, "activated").await;
    }
    Ok(room)
}

#[debug_handler]
pub async fn list_rooms(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rooms = db::list_rooms(&state.pool).await?;
    Ok(Json(json!({ "ok": true, "rooms": rooms })))
}

#[debug_handler]
pub async fn new_room(
    State(state): State<AppState>,
    form: Result<Form<NewRoomForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(NewRoomForm {
        room_id,
        webhook_url,
    }) = form?;
    if !is_ident(&room_id) {
        return Err(ApiError::BadRequest(
            "room_id must start with a letter or digit and contain only letters, digits, '-' or '_'"
                .into(),
        ));
    }
    match reqwest::Url::parse(&webhook_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => return Err(ApiError::BadRequest("webhook_url must be an http(s) URL".into())),
    }

    db::remove_inactive_room(&state.pool, &room_id).await?;
    let token = new_token();
    if !db::insert_room(&state.pool, &room_id, &webhook_url, &token).await? {
        return Err(ApiError::BadRequest(format!("room {room_id} already exists")));
    }

    let text = format!("registered  (token = `{token}`)");
    if let Err(err) = state.notifier.post(&webhook_url, &text).await {
        // The token is only ever delivered through the webhook.
        warn!(?err, room_id, "registration message failed; dropping room");
        db::delete_room(&state.pool, &room_id).await?;
        return Err(ApiError::BadRequest(
            "could not post the registration message to webhook_url".into(),
        ));
    }
    info!(room_id, "room registered");
    Ok(ok())
}

#[debug_handler]
pub async fn rotate_token(
    State(state): State<AppState>,
    form: Result<Form<RoomForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(RoomForm { room_id }) = form?;
    let Some(webhook_url) = db::room_webhook(&state.pool, &room_id).await? else {
        return Err(ApiError::NotFound("room"));
    };
    let token = new_token();
    if !db::rotate_token(&state.pool, &room_id, &token).await? {
        return Err(ApiError::NotFound("room"));
    }
    state
        .notifier
        .post(&webhook_url, &format!("token = `{token}`"))
        .await
        .map_err(ApiError::Upstream)?;
    info!(room_id, "token rotated");
    Ok(ok())
}

#[debug_handler]
pub async fn activate(
    State(state): State<AppState>,
    form: Result<Form<AuthForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(AuthForm { room_id, token }) = form?;
    authorize(&state, &room_id, &token).await?;
    Ok(ok())
}

#[debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    form: Result<Form<AuthForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(AuthForm { room_id, token }) = form?;
    let room = authorize(&state, &room_id, &token).await?;
    let users = db::list_users(&state.pool, &room.room_id).await?;
    Ok(Json(json!({ "ok": true, "users": users })))
}

#[debug_handler]
pub async fn add_user(
    State(state): State<AppState>,
    form: Result<Form<UserAddForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(UserAddForm {
        room_id,
        token,
        slack_id,
        atcoder_id,
    }) = form?;
    if !is_ident(&slack_id) || !is_ident(&atcoder_id) {
        return Err(ApiError::BadRequest(
            "slack_id and atcoder_id must be identifiers".into(),
        ));
    }
    let room = authorize(&state, &room_id, &token).await?;

    let exists = state
        .stats
        .user_exists(&atcoder_id)
        .await
        .map_err(|err| ApiError::Upstream(err.into()))?;
    if !exists {
        return Err(ApiError::BadRequest(format!(
            "AtCoder user {atcoder_id} does not exist"
        )));
    }

    db::add_user(&state.pool, &room.room_id, &slack_id, &atcoder_id).await?;
    info!(room_id, slack_id, atcoder_id, "user added");
    let text = format!("user @{slack_id} is added  (AtCoder: `{atcoder_id}`)");
    notify_best_effort(state.notifier.as_ref(), &room.webhook_url, &text).await;
    Ok(ok())
}

#[debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    form: Result<Form<UserDelForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(UserDelForm {
        room_id,
        token,
        slack_id,
    }) = form?;
    let room = authorize(&state, &room_id, &token).await?;
    if !db::delete_user(&state.pool, &room.room_id, &slack_id).await? {
        return Err(ApiError::NotFound("user"));
    }
    info!(room_id, slack_id, "user deleted");
    let text = format!("user @{slack_id} is deleted");
    notify_best_effort(state.notifier.as_ref(), &room.webhook_url, &text).await;
    Ok(ok())
}

#[debug_handler]
pub async fn delete_room(
    State(state): State<AppState>,
    form: Result<Form<AuthForm>, FormRejection>,
) -> ApiResult<Json<Value>> {
    let Form(AuthForm { room_id, token }) = form?;
    let room = authorize(&state, &room_id, &token).await?;
    db::delete_room(&state.pool, &room.room_id).await?;
    info!(room_id, "room deleted");
    notify_best_effort(state.notifier.as_ref(), &room.webhook_url, "deleted").await;
    Ok(ok())
}
