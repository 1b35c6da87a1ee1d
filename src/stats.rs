//! Client for the AtCoder Problems statistics API.
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::model::{Contest, ProblemInfo, Submission};

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("invalid endpoint: {0}")]
    Url(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("unknown contest {0}")]
    UnknownContest(String),
    #[error("unknown problem {0}")]
    UnknownProblem(String),
}

#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_contests(&self) -> Result<Vec<Contest>, StatsError>;

    async fn fetch_problems(&self) -> Result<Vec<ProblemInfo>, StatsError>;

    async fn fetch_submissions(&self, atcoder_id: &str) -> Result<Vec<Submission>, StatsError>;

    /// Whether the contest site knows this user.
    async fn user_exists(&self, atcoder_id: &str) -> Result<bool, StatsError>;
}

#[derive(Clone)]
pub struct StatsClient {
    http: Client,
    base_url: Url,
    profile_base_url: Url,
}

impl fmt::Debug for StatsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsClient")
            .field("base_url", &self.base_url)
            .field("profile_base_url", &self.profile_base_url)
            .finish_non_exhaustive()
    }
}

impl StatsClient {
    pub fn new(base_url: Url, profile_base_url: Url) -> Result<Self, StatsError> {
        let http = Client::builder()
            .user_agent(concat!("shoujin-notifier/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()?;
        Ok(Self {
            http,
            base_url,
            profile_base_url,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, StatsError> {
        let parse = |raw: &str| Url::parse(raw).map_err(|e| StatsError::Url(format!("{raw}: {e}")));
        Self::new(parse(&cfg.stats.base_url)?, parse(&cfg.stats.profile_base_url)?)
    }

    pub fn submissions_url(&self, atcoder_id: &str) -> Result<Url, StatsError> {
        let mut url = join(&self.base_url, "atcoder-api/results")?;
        url.query_pairs_mut().append_pair("user", atcoder_id);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, StatsError> {
        debug!(%url, "GET");
        let res = self.http.get(url.clone()).send().await?;
        if !res.status().is_success() {
            return Err(StatsError::Status {
                url: url.to_string(),
                status: res.status(),
            });
        }
        Ok(res.json::<T>().await?)
    }
}

#[async_trait]
impl StatsSource for StatsClient {
    #[instrument(skip_all)]
    async fn fetch_contests(&self) -> Result<Vec<Contest>, StatsError> {
        let url = join(&self.base_url, "resources/contests.json")?;
        self.get_json(url).await
    }

    #[instrument(skip_all)]
    async fn fetch_problems(&self) -> Result<Vec<ProblemInfo>, StatsError> {
        let url = join(&self.base_url, "resources/merged-problems.json")?;
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    async fn fetch_submissions(&self, atcoder_id: &str) -> Result<Vec<Submission>, StatsError> {
        let url = self.submissions_url(atcoder_id)?;
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    async fn user_exists(&self, atcoder_id: &str) -> Result<bool, StatsError> {
        let url = join(&self.profile_base_url, &format!("users/{atcoder_id}"))?;
        let res = self.http.get(url).send().await?;
        Ok(res.status() == StatusCode::OK)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, StatsError> {
    base.join(path)
        .map_err(|e| StatsError::Url(format!("{base} + {path}: {e}")))
}

/// Contest and problem titles indexed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    contests: HashMap<String, Contest>,
    problems: HashMap<String, ProblemInfo>,
}

impl Catalog {
    pub fn new(contests: Vec<Contest>, problems: Vec<ProblemInfo>) -> Self {
        Self {
            contests: contests.into_iter().map(|c| (c.id.clone(), c)).collect(),
            problems: problems.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub async fn fetch(stats: &dyn StatsSource) -> Result<Self, StatsError> {
        let contests = stats.fetch_contests().await?;
        let problems = stats.fetch_problems().await?;
        Ok(Self::new(contests, problems))
    }

    pub fn problem(&self, problem_id: &str) -> Result<&ProblemInfo, StatsError> {
        self.problems
            .get(problem_id)
            .ok_or_else(|| StatsError::UnknownProblem(problem_id.to_string()))
    }

    /// Display name `"{contest title}: {problem title}"`.
    pub fn problem_name(&self, contest_id: &str, problem_id: &str) -> Result<String, StatsError> {
        let contest = self
            .contests
            .get(contest_id)
            .ok_or_else(|| StatsError::UnknownContest(contest_id.to_string()))?;
        let problem = self.problem(problem_id)?;
        Ok(format!("{}: {}", contest.title, problem.title))
    }
}
