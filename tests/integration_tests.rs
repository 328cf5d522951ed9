//! Integration tests for feedwake
//!
//! CLI behaviour is checked through the built binary; the feed client, the
//! event stream and the dispatcher are checked against an in-process mock
//! feed served with axum.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a feedwake Command isolated from the caller's environment
fn feedwake(data_dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("feedwake");
    cmd.current_dir(data_dir.path())
        .arg("--data-dir")
        .arg(data_dir.path())
        .env_remove("FEED_URL")
        .env_remove("FEED_TOKEN")
        .env_remove("FEEDWAKE_PERMISSION_MODE")
        .env_remove("RUST_LOG");
    cmd
}

// =============================================================================
// Mock feed
// =============================================================================

mod mock_feed {
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct Recorded {
        pub statuses: Vec<(String, Value)>,
        pub sessions: Vec<(String, String, Value)>,
        pub post_queries: Vec<HashMap<String, String>>,
        pub comment_queries: Vec<HashMap<String, String>>,
        pub stream_connects: Vec<Option<String>>,
        pub authorization: Vec<Option<String>>,
    }

    pub type Shared = Arc<Mutex<Recorded>>;

    pub const MENTION: &str = "@claude-bot can you review this?";

    pub fn post() -> Value {
        json!({
            "id": "p1",
            "feed_id": "f1",
            "author_name": "alice",
            "author_type": "human",
            "content": "Flaky test in CI",
            "created_at": (Utc::now() - Duration::hours(1)).to_rfc3339(),
        })
    }

    pub fn comment() -> Value {
        json!({
            "id": "c1",
            "post_id": "p1",
            "feed_id": "f1",
            "author_name": "bob",
            "author_type": "human",
            "content": MENTION,
            "created_at": (Utc::now() - Duration::minutes(30)).to_rfc3339(),
        })
    }

    async fn feeds(State(state): State<Shared>, headers: HeaderMap) -> Json<Value> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        state.lock().unwrap().authorization.push(auth);
        Json(json!([{ "id": "f1", "name": "general" }]))
    }

    async fn posts(
        State(state): State<Shared>,
        Path(feed_id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if feed_id != "f1" {
            return (StatusCode::NOT_FOUND, "no such feed").into_response();
        }
        let second_page = query.get("cursor").map(String::as_str) == Some("next");
        state.lock().unwrap().post_queries.push(query);
        if second_page {
            Json(json!({ "items": [], "next_cursor": null })).into_response()
        } else {
            Json(json!({ "items": [post()], "next_cursor": "next" })).into_response()
        }
    }

    async fn comments(
        State(state): State<Shared>,
        Path(post_id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let human_wanted = query.get("author_type").is_none_or(|t| t == "human");
        let items = if post_id == "p1" && human_wanted {
            vec![comment()]
        } else {
            Vec::new()
        };
        state.lock().unwrap().comment_queries.push(query);
        Json(json!({ "items": items }))
    }

    async fn status(
        State(state): State<Shared>,
        Path(identity): Path<String>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        state.lock().unwrap().statuses.push((identity, body));
        StatusCode::NO_CONTENT
    }

    async fn session(
        State(state): State<Shared>,
        Path((identity, name)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        state.lock().unwrap().sessions.push((identity, name, body));
        StatusCode::NO_CONTENT
    }

    async fn me(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
        match query.get("backend").map(String::as_str) {
            Some(backend) => Json(json!({ "name": format!("{}-bot", backend) })).into_response(),
            None => (StatusCode::BAD_REQUEST, "backend required").into_response(),
        }
    }

    async fn events(State(state): State<Shared>, headers: HeaderMap) -> impl IntoResponse {
        let last_id = headers
            .get("last-event-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let first_connect = {
            let mut state = state.lock().unwrap();
            state.stream_connects.push(last_id);
            state.stream_connects.len() == 1
        };

        let body = if first_connect {
            let comment_frame = json!({ "comment": comment(), "post_created_by": "alice" });
            let post_frame = json!({ "type": "post_created", "event_id": "e2", "post": post() });
            format!(
                ": hello\n\n\
                 id: e1\nevent: comment_created\ndata: {comment_frame}\n\n\
                 event: heartbeat\ndata: {{}}\n\n\
                 data: not json\n\n\
                 id: e1\nevent: comment_created\ndata: {comment_frame}\n\n\
                 data: {post_frame}\n\n"
            )
        } else {
            String::new()
        };
        ([(header::CONTENT_TYPE, "text/event-stream")], body)
    }

    pub fn router(state: Shared) -> Router {
        Router::new()
            .route("/api/feeds", get(feeds))
            .route("/api/feeds/{feed_id}/posts", get(posts))
            .route("/api/posts/{post_id}/comments", get(comments))
            .route("/api/agents/{identity}/status", put(status))
            .route("/api/agents/{identity}/sessions/{name}", put(session))
            .route("/api/me", get(me))
            .route("/api/events", get(events))
            .with_state(state)
    }

    /// Serve the mock on an ephemeral port. Returns its base url.
    pub async fn start() -> (String, Shared) {
        let state = Shared::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_feedwake_help() {
        cargo_bin_cmd!("feedwake")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("scan"));
    }

    #[test]
    fn test_feedwake_version() {
        cargo_bin_cmd!("feedwake").arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_permission_mode_is_rejected() {
        let dir = TempDir::new().unwrap();
        feedwake(&dir)
            .args(["--permission-mode", "yolo", "queue"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("yolo"));
    }
}

// =============================================================================
// Config Commands
// =============================================================================

mod config_commands {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        feedwake(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created feedwake.toml"));

        let content = fs::read_to_string(dir.path().join("feedwake.toml")).unwrap();
        assert!(content.contains("[worker]"));
        assert!(content.contains("max_concurrent = 5"));
    }

    #[test]
    fn test_config_init_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("feedwake.toml"), "[worker]\nmax_concurrent = 2\n").unwrap();
        feedwake(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
        let content = fs::read_to_string(dir.path().join("feedwake.toml")).unwrap();
        assert_eq!(content, "[worker]\nmax_concurrent = 2\n");
    }

    #[test]
    fn test_config_show_reflects_overrides() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("feedwake.toml"),
            "[[backends]]\nkind = \"codex\"\nidentity = \"codex-helper\"\n",
        )
        .unwrap();
        feedwake(&dir)
            .args([
                "--feed-url",
                "http://feed.test",
                "--max-concurrent",
                "9",
                "--permission-mode",
                "readonly",
                "config",
                "show",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("url = \"http://feed.test\""))
            .stdout(predicate::str::contains("max_concurrent = 9"))
            .stdout(predicate::str::contains("permission_mode = \"readonly\""))
            .stdout(predicate::str::contains("identity = \"codex-helper\""))
            .stdout(predicate::str::contains("tool_url = \"http://feed.test/mcp\""));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("feedwake.toml"),
            "[worker]\nmax_concurrent = 0\n[[backends]]\nkind = \"claude\"\n[[backends]]\nkind = \"claude\"\n",
        )
        .unwrap();
        feedwake(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_concurrent is 0"))
            .stdout(predicate::str::contains("more than once"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("feedwake.toml"), "[worker\n").unwrap();
        feedwake(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("feedwake.toml"));
    }
}

// =============================================================================
// State Commands
// =============================================================================

mod state_commands {
    use super::*;

    fn queued_trigger(event_id: &str) -> serde_json::Value {
        serde_json::json!({
            "trigger_type": "mention",
            "event_id": event_id,
            "source_id": "c1",
            "feed_id": "f1",
            "post_id": "p1",
            "content": "@claude-bot hi",
            "author_name": "bob",
            "author_is_bot": false,
            "session_name": "default",
            "backend_type": "claude",
        })
    }

    #[test]
    fn test_queue_show_empty() {
        let dir = TempDir::new().unwrap();
        feedwake(&dir)
            .args(["queue", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Queue is empty"));
    }

    #[test]
    fn test_queue_show_and_clear() {
        let dir = TempDir::new().unwrap();
        let queue = serde_json::json!([queued_trigger("c1#claude/default")]);
        fs::write(dir.path().join("queue.json"), queue.to_string()).unwrap();

        feedwake(&dir)
            .args(["queue", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 pending trigger(s)"))
            .stdout(predicate::str::contains("claude:default"));

        feedwake(&dir)
            .args(["queue", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dropped 1 pending trigger(s)"));

        let content = fs::read_to_string(dir.path().join("queue.json")).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_corrupt_queue_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("queue.json"), "[{ broken").unwrap();
        feedwake(&dir)
            .args(["queue"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Queue is empty"));
    }

    #[test]
    fn test_sessions_lists_all_documents() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sessions")).unwrap();
        fs::write(
            dir.path().join("sessions/claude.json"),
            r#"{"default": "sess-123", "reviewer": "sess-456"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("post_sessions.json"),
            r#"{"p1": [{"backend": "claude", "session_name": "reviewer"}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("follows.json"), r#"["p1", "p2"]"#).unwrap();

        feedwake(&dir)
            .arg("sessions")
            .assert()
            .success()
            .stdout(predicate::str::contains("sess-123"))
            .stdout(predicate::str::contains("sess-456"))
            .stdout(predicate::str::contains("claude:reviewer"))
            .stdout(predicate::str::contains("Followed posts (2)"));
    }
}

// =============================================================================
// Against the mock feed
// =============================================================================

mod feed_client {
    use super::mock_feed;
    use feedwake::feed::{FeedApi, FeedClient, ListQuery, list_all_posts, recent_comments};
    use feedwake_common::{AgentStatus, AuthorType, BackendType};

    #[tokio::test]
    async fn test_rest_surface_round_trip() {
        let (url, state) = mock_feed::start().await;
        let client = FeedClient::new(&url, Some("secret".into())).unwrap();

        let feeds = client.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].name, "general");

        let posts = list_all_posts(&client, "f1", &ListQuery::default()).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author_type, AuthorType::Human);

        let comments = recent_comments(&client, "p1", 10).await.unwrap();
        assert_eq!(comments[0].content, mock_feed::MENTION);

        client
            .set_status("claude-bot", AgentStatus::Thinking, Some("p1"))
            .await
            .unwrap();
        client
            .report_session("claude-bot", "default", BackendType::Claude, "sess-9")
            .await
            .unwrap();
        assert_eq!(client.whoami(BackendType::Gemini).await.unwrap(), "gemini-bot");

        let recorded = state.lock().unwrap();
        assert_eq!(recorded.authorization[0].as_deref(), Some("Bearer secret"));
        assert_eq!(recorded.post_queries.len(), 2);
        assert_eq!(recorded.post_queries[1].get("cursor").map(String::as_str), Some("next"));
        assert_eq!(recorded.comment_queries[0].get("limit").map(String::as_str), Some("10"));
        assert_eq!(recorded.statuses[0].0, "claude-bot");
        assert_eq!(recorded.statuses[0].1["status"], "thinking");
        assert_eq!(recorded.statuses[0].1["post_id"], "p1");
        assert_eq!(recorded.sessions[0].1, "default");
        assert_eq!(recorded.sessions[0].2["backend"], "claude");
        assert_eq!(recorded.sessions[0].2["session_id"], "sess-9");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (url, _state) = mock_feed::start().await;
        let client = FeedClient::new(&url, None).unwrap();
        let err = client
            .list_posts("missing", &ListQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, feedwake::errors::FeedError::Status { status: 404, .. }));
    }
}

mod event_stream {
    use super::mock_feed;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{HeaderMap, header};
    use axum::routing::get;
    use bytes::Bytes;
    use feedwake::feed::EventStream;
    use feedwake::settings::StreamSection;
    use feedwake_common::FeedEvent;
    use futures_util::{StreamExt, stream};
    use serde_json::json;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_stream_delivers_dedups_and_resumes() {
        let (url, state) = mock_feed::start().await;
        let stream = EventStream::new(&url, None, &StreamSection::default()).unwrap();
        let close = stream.close_handle();
        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(stream.run(tx));

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        match first {
            FeedEvent::CommentCreated {
                event_id,
                comment,
                post_created_by,
            } => {
                assert_eq!(event_id.as_deref(), Some("e1"));
                assert_eq!(comment.id, "c1");
                assert_eq!(post_created_by.as_deref(), Some("alice"));
            }
            other => panic!("Expected comment event, got {:?}", other),
        }

        // Heartbeat, malformed payload and the replayed e1 are all skipped.
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(second, FeedEvent::PostCreated { ref event_id, .. } if event_id.as_deref() == Some("e2")));

        // The server closes the response; the client reconnects after the
        // initial backoff and resumes from the last delivered id.
        let mut resumed = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let recorded = state.lock().unwrap();
            if recorded.stream_connects.len() >= 2 {
                assert_eq!(recorded.stream_connects[0], None);
                assert_eq!(recorded.stream_connects[1].as_deref(), Some("e2"));
                resumed = true;
                break;
            }
        }
        assert!(resumed, "stream did not reconnect");

        close.cancel();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(rx.try_recv().is_err());
    }

    /// Serve an event stream that sends one frame and then goes silent
    /// without closing. Returns the base url and the Last-Event-ID of every
    /// connect.
    async fn start_stalling_feed() -> (String, Arc<Mutex<Vec<Option<String>>>>) {
        let connects: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
        let recorded = connects.clone();
        let app = Router::new().route(
            "/api/events",
            get(move |headers: HeaderMap| {
                let recorded = recorded.clone();
                async move {
                    let last_id = headers
                        .get("last-event-id")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    let frame = {
                        let mut connects = recorded.lock().unwrap();
                        connects.push(last_id);
                        let frame = json!({
                            "type": "post_created",
                            "event_id": format!("s{}", connects.len()),
                            "post": mock_feed::post(),
                        });
                        Bytes::from(format!("data: {frame}\n\n"))
                    };
                    let body = stream::once(async move { Ok::<_, Infallible>(frame) })
                        .chain(stream::pending());
                    ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), connects)
    }

    #[tokio::test]
    async fn test_silent_connection_is_dropped_and_resumed() {
        let (url, connects) = start_stalling_feed().await;
        let settings = StreamSection {
            idle_timeout_secs: 1,
            ..StreamSection::default()
        };
        let stream = EventStream::new(&url, None, &settings).unwrap();
        let close = stream.close_handle();
        let (tx, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(stream.run(tx));

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.event_id(), Some("s1"));

        // The server never closes the response; only the idle window can
        // end the first connection.
        let second = timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.event_id(), Some("s2"));
        {
            let connects = connects.lock().unwrap();
            assert_eq!(connects[0], None);
            assert_eq!(connects[1].as_deref(), Some("s1"));
        }

        close.cancel();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}

mod dispatch_end_to_end {
    use super::mock_feed;
    use async_trait::async_trait;
    use feedwake::backend::{BackendAgent, ClaudeAdapter, ToolEndpoint};
    use feedwake::dispatch::{DispatchSettings, Dispatcher, JobSettings, Stores};
    use feedwake::errors::InvokeError;
    use feedwake::feed::FeedClient;
    use feedwake::invoker::{AgentRunner, Invocation, Outcome};
    use feedwake::settings::PermissionMode;
    use feedwake::store::{FollowSet, PostSessions, SessionStore, TriggerQueue};
    use feedwake_common::{BackendType, Comment, FeedEvent};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Scripted {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AgentRunner for Scripted {
        async fn run(&self, invocation: Invocation) -> Result<Outcome, InvokeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(!invocation.resumed);
            assert!(invocation.args.iter().any(|a| a.contains("untrusted-content")));
            Ok(Outcome::Completed {
                session_id: Some("sess-1".into()),
            })
        }
    }

    #[tokio::test]
    async fn test_live_mention_runs_once_and_records_session() {
        let (url, state) = mock_feed::start().await;
        let dir = TempDir::new().unwrap();
        let session_path = dir.path().join("sessions/claude.json");

        let agent = BackendAgent {
            adapter: Arc::new(ClaudeAdapter::new(
                "claude".into(),
                dir.path().join("mcp/claude.json"),
            )),
            identity: "claude-bot".into(),
            model: None,
            tool: ToolEndpoint {
                url: format!("{}/mcp", url),
                token: None,
            },
            sessions: SessionStore::open(&session_path),
        };
        let stores = Stores {
            queue: TriggerQueue::open(dir.path().join("queue.json")),
            follows: FollowSet::open(dir.path().join("follows.json")),
            post_sessions: PostSessions::open(dir.path().join("post_sessions.json")),
        };
        let settings = DispatchSettings {
            max_concurrent: 5,
            max_wake_attempts: 3,
            max_bot_mentions_per_post: 4,
            retry_delay: Duration::from_millis(50),
            scan_lookback_hours: 24,
            job: JobSettings {
                crash_retries: 3,
                context_comments: 10,
                permission_mode: PermissionMode::Standard,
                allowed_tools: vec!["Read".into()],
                browser: false,
            },
        };
        let runner = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
        });
        let api = Arc::new(FeedClient::new(&url, None).unwrap());
        let dispatcher = Dispatcher::new(settings, api, runner.clone(), vec![agent], stores);

        let comment: Comment = serde_json::from_value(mock_feed::comment()).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(rx, shutdown.clone()));
        tx.send(FeedEvent::CommentCreated {
            event_id: Some("e1".into()),
            comment,
            post_created_by: Some("alice".into()),
        })
        .await
        .unwrap();

        let mut recorded = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if std::fs::read_to_string(&session_path).is_ok_and(|s| s.contains("sess-1")) {
                recorded = true;
                break;
            }
        }
        assert!(recorded, "session was not persisted");

        // Let the follow-up sweep settle before stopping.
        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.cancel();
        let dispatcher = handle.await.unwrap();

        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        assert!(dispatcher.stores().follows.contains("p1"));
        assert_eq!(dispatcher.stores().post_sessions.participants("p1").len(), 1);
        assert_eq!(
            dispatcher
                .agent(BackendType::Claude)
                .and_then(|a| a.sessions.get("default")),
            Some("sess-1")
        );

        let recorded = state.lock().unwrap();
        let statuses: Vec<&str> = recorded
            .statuses
            .iter()
            .filter_map(|(_, body)| body["status"].as_str())
            .collect();
        assert_eq!(statuses, vec!["thinking", "idle"]);
        assert_eq!(recorded.sessions.len(), 1);
    }
}

// =============================================================================
// Scan command against the mock feed
// =============================================================================

mod scan_command {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_prints_and_enqueues_mention() {
        let (url, state) = mock_feed::start().await;

        let (output, dir) = tokio::task::spawn_blocking(move || {
            let dir = TempDir::new().unwrap();
            let output = feedwake(&dir)
                .args(["--feed-url", &url, "scan", "--enqueue"])
                .output()
                .unwrap();
            (output, dir)
        })
        .await
        .unwrap();

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success(), "scan failed: {}", String::from_utf8_lossy(&output.stderr));
        assert!(stdout.contains("mention"), "stdout: {stdout}");
        assert!(stdout.contains("claude:default"), "stdout: {stdout}");
        assert!(stdout.contains("Queued 1 trigger(s)"), "stdout: {stdout}");

        let identities = fs::read_to_string(dir.path().join("identities.json")).unwrap();
        assert!(identities.contains("claude-bot"));
        let queue = fs::read_to_string(dir.path().join("queue.json")).unwrap();
        assert!(queue.contains("c1#claude/default"));

        let recorded = state.lock().unwrap();
        assert!(recorded.post_queries.iter().all(|q| q.contains_key("since")));
        let authors: Vec<&str> = recorded
            .comment_queries
            .iter()
            .filter_map(|q| q.get("author_type").map(String::as_str))
            .collect();
        assert_eq!(authors, vec!["human", "agent"]);
    }
}
