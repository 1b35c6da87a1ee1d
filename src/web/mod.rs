//! Admin HTTP service: room registration, token rotation and tracked users.
mod error;
pub mod rooms;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::db::Pool;
use crate::stats::StatsSource;
use crate::webhook::Notifier;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub notifier: Arc<dyn Notifier>,
    pub stats: Arc<dyn StatsSource>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/room/list", get(rooms::list_rooms))
        .route("/room/new", post(rooms::new_room))
        .route("/room/token", post(rooms::rotate_token))
        .route("/room/activate", post(rooms::activate))
        .route("/room/users", post(rooms::list_users))
        .route("/room/useradd", post(rooms::add_user))
        .route("/room/userdel", post(rooms::delete_user))
        .route("/room/delete", post(rooms::delete_room))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}
