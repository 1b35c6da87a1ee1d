use anyhow::{anyhow, Result};
use serde_json::Value;
use shoujin_notifier::db;
use shoujin_notifier::model::{Contest, ProblemInfo, Submission};
use shoujin_notifier::stats::{StatsError, StatsSource};
use shoujin_notifier::web::{self, AppState};
use shoujin_notifier::webhook::Notifier;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const HOOK: &str = "https://hooks.example.com/services/general";

#[derive(Clone, Default)]
struct RecordingNotifier {
    posts: Arc<Mutex<Vec<(String, String)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingNotifier {
    async fn texts(&self) -> Vec<String> {
        self.posts.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, webhook_url: &str, text: &str) -> Result<()> {
        if *self.fail.lock().await {
            return Err(anyhow!("webhook down"));
        }
        self.posts
            .lock()
            .await
            .push((webhook_url.to_string(), text.to_string()));
        Ok(())
    }
}

/// Only answers the profile lookup used by `/room/useradd`.
#[derive(Clone, Default)]
struct KnownUsers(Arc<HashSet<String>>);

#[async_trait::async_trait]
impl StatsSource for KnownUsers {
    async fn fetch_contests(&self) -> Result<Vec<Contest>, StatsError> {
        Ok(Vec::new())
    }

    async fn fetch_problems(&self) -> Result<Vec<ProblemInfo>, StatsError> {
        Ok(Vec::new())
    }

    async fn fetch_submissions(&self, _atcoder_id: &str) -> Result<Vec<Submission>, StatsError> {
        Ok(Vec::new())
    }

    async fn user_exists(&self, atcoder_id: &str) -> Result<bool, StatsError> {
        Ok(self.0.contains(atcoder_id))
    }
}

/// Profile lookups fail as if the statistics site were down.
struct ProfilesDown;

#[async_trait::async_trait]
impl StatsSource for ProfilesDown {
    async fn fetch_contests(&self) -> Result<Vec<Contest>, StatsError> {
        Ok(Vec::new())
    }

    async fn fetch_problems(&self) -> Result<Vec<ProblemInfo>, StatsError> {
        Ok(Vec::new())
    }

    async fn fetch_submissions(&self, _atcoder_id: &str) -> Result<Vec<Submission>, StatsError> {
        Ok(Vec::new())
    }

    async fn user_exists(&self, _atcoder_id: &str) -> Result<bool, StatsError> {
        Err(StatsError::Url("profile site unreachable".into()))
    }
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    notifier: RecordingNotifier,
    pool: sqlx::SqlitePool,
}

impl TestServer {
    async fn start() -> Self {
        let stats = KnownUsers(Arc::new(["tourist".to_string()].into_iter().collect()));
        Self::start_with(Arc::new(stats)).await
    }

    async fn start_with(stats: Arc<dyn StatsSource>) -> Self {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let notifier = RecordingNotifier::default();
        let state = AppState {
            pool: pool.clone(),
            notifier: Arc::new(notifier.clone()),
            stats,
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(web::serve(listener, state));
        Self {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            notifier,
            pool,
        }
    }

    async fn post(&self, path: &str, form: &[(&str, &str)]) -> (u16, Value) {
        let res = self
            .http
            .post(format!("{}{}", self.base, path))
            .form(form)
            .send()
            .await
            .unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let res = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Token from the most recent message that announced one.
    async fn last_token(&self) -> String {
        let texts = self.notifier.texts().await;
        let text = texts
            .iter()
            .rev()
            .find(|t| t.contains("token = `"))
            .expect("a token message");
        let start = text.find('`').unwrap() + 1;
        let end = text[start..].find('`').unwrap() + start;
        text[start..end].to_string()
    }

    async fn register(&self, room_id: &str) -> String {
        let (status, body) = self
            .post("/room/new", &[("room_id", room_id), ("webhook_url", HOOK)])
            .await;
        assert_eq!(status, 200, "{body}");
        self.last_token().await
    }
}

#[tokio::test]
async fn registering_room_posts_token() {
    let srv = TestServer::start().await;
    let token = srv.register("general").await;
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(
        srv.notifier.texts().await,
        vec![format!("registered  (token = `{token}`)")]
    );

    let (status, body) = srv.get("/room/list").await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["rooms"][0]["room_id"], "general");
    assert_eq!(body["rooms"][0]["activated"], false);
}

#[tokio::test]
async fn non_identifier_room_ids_are_rejected() {
    let srv = TestServer::start().await;
    for bad in ["", "-general", "gen eral", "general!", "../x"] {
        let (status, body) = srv
            .post("/room/new", &[("room_id", bad), ("webhook_url", HOOK)])
            .await;
        assert_eq!(status, 400, "room id {bad:?}");
        assert_eq!(body["ok"], false);
    }
    assert!(srv.notifier.texts().await.is_empty());
    assert!(db::list_rooms(&srv.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let srv = TestServer::start().await;
    let (status, body) = srv.post("/room/new", &[("room_id", "general")]).await;
    assert_eq!(status, 400);
    assert_eq!(body["ok"], false);
    let (status, _) = srv.post("/room/useradd", &[("room_id", "general")]).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn inactive_registration_can_be_replaced_but_active_cannot() {
    let srv = TestServer::start().await;
    let first = srv.register("general").await;
    let second = srv.register("general").await;
    assert_ne!(first, second);

    let (status, _) = srv
        .post("/room/activate", &[("room_id", "general"), ("token", &second)])
        .await;
    assert_eq!(status, 200);

    let (status, body) = srv
        .post("/room/new", &[("room_id", "general"), ("webhook_url", HOOK)])
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn unreachable_webhook_undoes_registration() {
    let srv = TestServer::start().await;
    *srv.notifier.fail.lock().await = true;
    let (status, _) = srv
        .post("/room/new", &[("room_id", "general"), ("webhook_url", HOOK)])
        .await;
    assert_eq!(status, 400);
    assert!(db::list_rooms(&srv.pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn activation_notifies_exactly_once() {
    let srv = TestServer::start().await;
    let token = srv.register("general").await;

    for _ in 0..3 {
        let (status, body) = srv
            .post("/room/activate", &[("room_id", "general"), ("token", &token)])
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["ok"], true);
    }
    let (status, _) = srv
        .post("/room/users", &[("room_id", "general"), ("token", &token)])
        .await;
    assert_eq!(status, 200);

    let activated = srv
        .notifier
        .texts()
        .await
        .into_iter()
        .filter(|t| t == "activated")
        .count();
    assert_eq!(activated, 1);
}

#[tokio::test]
async fn wrong_token_is_forbidden_and_does_not_activate() {
    let srv = TestServer::start().await;
    srv.register("general").await;
    let (status, body) = srv
        .post("/room/activate", &[("room_id", "general"), ("token", "nope")])
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["ok"], false);
    let (status, _) = srv
        .post("/room/delete", &[("room_id", "nowhere"), ("token", "nope")])
        .await;
    assert_eq!(status, 403);
    assert!(!srv.notifier.texts().await.contains(&"activated".to_string()));
}

#[tokio::test]
async fn token_rotation() {
    let srv = TestServer::start().await;
    let old = srv.register("general").await;

    let (status, _) = srv.post("/room/token", &[("room_id", "missing")]).await;
    assert_eq!(status, 404);

    let (status, _) = srv.post("/room/token", &[("room_id", "general")]).await;
    assert_eq!(status, 200);
    let new = srv.last_token().await;
    assert_ne!(old, new);
    assert!(srv.notifier.texts().await.contains(&format!("token = `{new}`")));

    let (status, _) = srv
        .post("/room/activate", &[("room_id", "general"), ("token", &old)])
        .await;
    assert_eq!(status, 403);
    let (status, _) = srv
        .post("/room/activate", &[("room_id", "general"), ("token", &new)])
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn token_rotation_with_unreachable_webhook_is_bad_gateway() {
    let srv = TestServer::start().await;
    let old = srv.register("general").await;
    *srv.notifier.fail.lock().await = true;

    let (status, body) = srv.post("/room/token", &[("room_id", "general")]).await;
    assert_eq!(status, 502);
    assert_eq!(body["ok"], false);

    // The new token was stored even though nobody received it.
    let (status, _) = srv
        .post("/room/activate", &[("room_id", "general"), ("token", &old)])
        .await;
    assert_eq!(status, 403);

    *srv.notifier.fail.lock().await = false;
    let (status, _) = srv.post("/room/token", &[("room_id", "general")]).await;
    assert_eq!(status, 200);
    let new = srv.last_token().await;
    let (status, _) = srv
        .post("/room/activate", &[("room_id", "general"), ("token", &new)])
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn useradd_with_profile_lookup_down_is_bad_gateway() {
    let srv = TestServer::start_with(Arc::new(ProfilesDown)).await;
    let token = srv.register("general").await;

    let (status, body) = srv
        .post(
            "/room/useradd",
            &[
                ("room_id", "general"),
                ("token", &token),
                ("slack_id", "tourist_fan"),
                ("atcoder_id", "tourist"),
            ],
        )
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["ok"], false);
    assert!(db::list_users(&srv.pool, "general").await.unwrap().is_empty());
}

#[tokio::test]
async fn user_management() {
    let srv = TestServer::start().await;
    let token = srv.register("general").await;
    let auth = [("room_id", "general"), ("token", token.as_str())];

    let (status, _) = srv
        .post(
            "/room/useradd",
            &[auth[0], auth[1], ("slack_id", "kimi yuki"), ("atcoder_id", "tourist")],
        )
        .await;
    assert_eq!(status, 400);

    let (status, body) = srv
        .post(
            "/room/useradd",
            &[auth[0], auth[1], ("slack_id", "ghost"), ("atcoder_id", "nobody")],
        )
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("nobody"));

    let (status, _) = srv
        .post(
            "/room/useradd",
            &[auth[0], auth[1], ("slack_id", "tourist_fan"), ("atcoder_id", "tourist")],
        )
        .await;
    assert_eq!(status, 200);
    assert!(srv
        .notifier
        .texts()
        .await
        .contains(&"user @tourist_fan is added  (AtCoder: `tourist`)".to_string()));

    let (status, body) = srv.post("/room/users", &auth).await;
    assert_eq!(status, 200);
    assert_eq!(body["users"][0]["user_id"], "tourist_fan");
    assert_eq!(body["users"][0]["atcoder_id"], "tourist");

    let (status, _) = srv
        .post("/room/userdel", &[auth[0], auth[1], ("slack_id", "someone")])
        .await;
    assert_eq!(status, 404);

    let (status, _) = srv
        .post("/room/userdel", &[auth[0], auth[1], ("slack_id", "tourist_fan")])
        .await;
    assert_eq!(status, 200);
    assert!(srv
        .notifier
        .texts()
        .await
        .contains(&"user @tourist_fan is deleted".to_string()));
    let (_, body) = srv.post("/room/users", &auth).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn deleting_room_removes_it() {
    let srv = TestServer::start().await;
    let token = srv.register("general").await;
    let (status, _) = srv
        .post("/room/delete", &[("room_id", "general"), ("token", &token)])
        .await;
    assert_eq!(status, 200);
    assert_eq!(srv.notifier.texts().await.last().map(String::as_str), Some("deleted"));

    let (_, body) = srv.get("/room/list").await;
    assert_eq!(body["rooms"].as_array().unwrap().len(), 0);
}
