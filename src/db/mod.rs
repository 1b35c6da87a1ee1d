//! Database module: row models and SQL repositories.
//!
//! - `model`: typed rows returned by repositories.
//! - `repo`: SQL-only functions for rooms, tracked users, submissions and the
//!   per-room report cursor.
//!
//! The repository API is re-exported at `crate::db::*`.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{AcceptedProblem, Room, RoomSummary, SubmissionRecord, TrackedUser};
