use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Verdict string for an accepted submission.
pub const ACCEPTED: &str = "AC";

const ATCODER_BASE: &str = "https://atcoder.jp";

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Za-z][0-9A-Za-z_-]*$").expect("valid ident regex"));
static SERVICE_USER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Za-z]+$").expect("valid user id regex"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contest {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemInfo {
    pub id: String,
    pub contest_id: String,
    pub title: String,
    #[serde(default)]
    pub point: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub id: i64,
    #[serde(default)]
    pub epoch_second: i64,
    pub problem_id: String,
    pub contest_id: String,
    pub user_id: String,
    pub result: String,
    #[serde(default)]
    pub point: Option<f64>,
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        self.result == ACCEPTED
    }

    pub fn url(&self) -> String {
        submission_url(&self.contest_id, self.id)
    }

    pub fn problem_url(&self) -> String {
        problem_url(&self.contest_id, &self.problem_id)
    }
}

pub fn problem_url(contest_id: &str, problem_id: &str) -> String {
    format!("{ATCODER_BASE}/contests/{contest_id}/tasks/{problem_id}")
}

pub fn submission_url(contest_id: &str, submission_id: i64) -> String {
    format!("{ATCODER_BASE}/contests/{contest_id}/submissions/{submission_id}")
}

/// Room ids and chat handles: an alphanumeric head followed by
/// alphanumerics, `-` or `_`.
pub fn is_ident(s: &str) -> bool {
    IDENT_RE.is_match(s)
}

/// AtCoder ids that are safe to use as file names.
pub fn is_service_user_id(s: &str) -> bool {
    SERVICE_USER_RE.is_match(s)
}
