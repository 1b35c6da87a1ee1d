//! Row models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Room {
    pub room_id: String,
    pub webhook_url: String,
    pub activated: bool,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of a room for `/room/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct RoomSummary {
    pub room_id: String,
    pub activated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct TrackedUser {
    /// Chat handle.
    pub user_id: String,
    pub atcoder_id: String,
}

/// One API submission resolved to the rows it touches.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub submission_url: String,
    pub problem_url: String,
    pub problem_name: String,
    pub result: String,
    pub score: Option<f64>,
}

/// A problem whose first accepted submission appeared after a cursor.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AcceptedProblem {
    pub problem_url: String,
    pub problem_name: String,
    pub score: Option<f64>,
}
