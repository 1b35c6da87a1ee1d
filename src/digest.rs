//! Accepted-problem deltas and the text digests posted to rooms.
use std::collections::BTreeSet;

use crate::db::AcceptedProblem;
use crate::model::Submission;

const OMITTED: &str = "(omitted...)";

/// Problem ids accepted in `new` but not in `old`.
pub fn accepted_delta(new: &[Submission], old: &[Submission]) -> BTreeSet<String> {
    let before: BTreeSet<&str> = old
        .iter()
        .filter(|s| s.is_accepted())
        .map(|s| s.problem_id.as_str())
        .collect();
    new.iter()
        .filter(|s| s.is_accepted() && !before.contains(s.problem_id.as_str()))
        .map(|s| s.problem_id.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolvedProblem {
    pub name: String,
    pub url: String,
    pub score: Option<f64>,
}

impl SolvedProblem {
    fn line(&self) -> String {
        match self.score {
            Some(score) => format!("{} ({:?} pts) {}", self.name, score, self.url),
            None => format!("{} {}", self.name, self.url),
        }
    }
}

impl From<AcceptedProblem> for SolvedProblem {
    fn from(row: AcceptedProblem) -> Self {
        Self {
            name: row.problem_name,
            url: row.problem_url,
            score: row.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDigest {
    pub handle: String,
    pub problems: Vec<SolvedProblem>,
}

impl UserDigest {
    pub fn new(handle: impl Into<String>, problems: Vec<SolvedProblem>) -> Self {
        Self {
            handle: handle.into(),
            problems,
        }
    }

    pub fn count(&self) -> usize {
        self.problems.len()
    }

    /// Header line plus one line per problem, or `(omitted...)` once the
    /// count reaches `max_listed`.
    pub fn render(&self, max_listed: usize) -> String {
        let mut lines = vec![format!(
            "@{} solved *{}* problems!",
            self.handle,
            self.count()
        )];
        if self.count() >= max_listed {
            lines.push(OMITTED.to_string());
        } else {
            lines.extend(self.problems.iter().map(SolvedProblem::line));
        }
        lines.join("\n")
    }
}

/// Join non-empty digests, busiest user first. An empty string means there
/// is nothing to post.
pub fn compose(mut digests: Vec<UserDigest>, max_listed: usize) -> String {
    digests.retain(|d| d.count() > 0);
    digests.sort_by(|a, b| b.count().cmp(&a.count()));
    digests
        .iter()
        .map(|d| d.render(max_listed))
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}
