use std::net::SocketAddr;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{analytics, auth, entries};

pub fn build_app(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(entries::router(max_body_bytes))
                .merge(analytics::router())
                .route("/health", get(health)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "storage": state.config.backend.as_str() }))
}

pub async fn serve(app: Router, state: &AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, HeaderMap, Method, Request, StatusCode},
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use time::Date;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::AppConfig;
    use crate::entries::repo::{EntryRepo, MemoryEntryRepo};
    use crate::entries::repo_types::{EntryPatch, EntrySummary, JournalEntry, NewEntry};

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        json: Value,
    }

    impl Reply {
        /// `name=value` pair from the Set-Cookie header, ready for a Cookie header.
        fn cookie(&self) -> String {
            self.headers
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(';').next())
                .map(str::to_string)
                .expect("set-cookie header")
        }
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        let req = match body {
            Some(v) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Reply { status, headers, json }
    }

    fn app() -> Router {
        build_app(AppState::fake())
    }

    async fn signed_up(app: &Router, username: &str) -> String {
        let r = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": username, "password": "secret1" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::CREATED);
        r.cookie()
    }

    #[tokio::test]
    async fn register_login_and_gate() {
        let app = app();
        let r = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "secret1" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::CREATED);
        assert_eq!(r.json["username"], "alice");
        assert!(r.json.get("passwordHash").is_none());
        let set_cookie = r.headers[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.contains("HttpOnly"));

        let r = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);

        let r = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "secret1" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        let cookie = r.cookie();

        let r = send(&app, Method::GET, "/api/entries", None, None).await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);

        let r = send(&app, Method::GET, "/api/auth/me", Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json["username"], "alice");
    }

    #[tokio::test]
    async fn registration_validation() {
        let app = app();
        let r = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "bob", "password": "short" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
        assert_eq!(r.json["details"][0]["field"], "password");

        signed_up(&app, "bob").await;
        let r = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "bob", "password": "another1" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
        assert_eq!(r.json["error"], "Username already taken");

        let r = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "carol" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = app();
        let cookie = signed_up(&app, "dana").await;

        let r = send(&app, Method::POST, "/api/auth/logout", Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json["message"], "Logged out");

        let r = send(&app, Method::GET, "/api/auth/me", Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);

        let r = send(&app, Method::POST, "/api/auth/logout", None, None).await;
        assert_eq!(r.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn entry_crud_roundtrip() {
        let app = app();
        let cookie = signed_up(&app, "erin").await;

        let r = send(
            &app,
            Method::POST,
            "/api/entries",
            Some(&cookie),
            Some(json!({
                "date": "2024-06-12T09:30:00",
                "targetPlan": "Finish chapter 3",
                "reflection": "Good focus",
                "mood": "good",
                "gymStatus": "worked_out",
                "images": ["data:image/png;base64,iVBORw0KGgo="]
            })),
        )
        .await;
        assert_eq!(r.status, StatusCode::CREATED);
        let id = r.json["id"].as_str().unwrap().to_string();
        assert_eq!(r.json["date"], "2024-06-12");
        assert_eq!(r.json["targetMet"], false);
        assert!(r.json["food"].is_null());
        assert_eq!(
            r.headers[header::LOCATION].to_str().unwrap(),
            format!("/api/entries/{id}")
        );
        let created = r.json.clone();

        let r = send(&app, Method::GET, &format!("/api/entries/{id}"), Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json, created);

        let r = send(
            &app,
            Method::GET,
            "/api/entries/date/2024-06-12",
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json["id"], created["id"]);

        let r = send(
            &app,
            Method::PATCH,
            &format!("/api/entries/{id}"),
            Some(&cookie),
            Some(json!({ "mood": null, "targetMet": true, "food": "salad" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert!(r.json["mood"].is_null());
        assert_eq!(r.json["targetMet"], true);
        assert_eq!(r.json["food"], "salad");
        assert_eq!(r.json["reflection"], "Good focus");

        let r = send(
            &app,
            Method::PATCH,
            &format!("/api/entries/{id}"),
            Some(&cookie),
            Some(json!({ "userId": "00000000-0000-0000-0000-000000000000" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);

        let r = send(&app, Method::GET, "/api/entries", Some(&cookie), None).await;
        assert_eq!(r.json.as_array().unwrap().len(), 1);

        let r = send(&app, Method::DELETE, &format!("/api/entries/{id}"), Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::NO_CONTENT);

        let r = send(&app, Method::GET, &format!("/api/entries/{id}"), Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::NOT_FOUND);

        let r = send(&app, Method::GET, "/api/entries/not-a-uuid", Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn entry_validation_errors_list_fields() {
        let app = app();
        let cookie = signed_up(&app, "finn").await;
        let r = send(
            &app,
            Method::POST,
            "/api/entries",
            Some(&cookie),
            Some(json!({ "date": "2024-06-12", "mood": "meh" })),
        )
        .await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
        assert_eq!(r.json["details"][0]["field"], "mood");
    }

    #[tokio::test]
    async fn other_users_entries_are_forbidden() {
        let app = app();
        let alice = signed_up(&app, "alice").await;
        let bob = signed_up(&app, "bob").await;

        let r = send(
            &app,
            Method::POST,
            "/api/entries",
            Some(&alice),
            Some(json!({ "date": "2024-06-12", "reflection": "private" })),
        )
        .await;
        let uri = format!("/api/entries/{}", r.json["id"].as_str().unwrap());

        let r = send(&app, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(r.status, StatusCode::FORBIDDEN);
        let r = send(&app, Method::PATCH, &uri, Some(&bob), Some(json!({ "food": "x" }))).await;
        assert_eq!(r.status, StatusCode::FORBIDDEN);
        let r = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(r.status, StatusCode::FORBIDDEN);

        let r = send(&app, Method::GET, "/api/entries", Some(&bob), None).await;
        assert_eq!(r.json, json!([]));

        let r = send(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert!(r.json["food"].is_null());
    }

    #[tokio::test]
    async fn analytics_and_import() {
        let app = app();
        let cookie = signed_up(&app, "gwen").await;

        let csv = "Day,Date,Journal\n\
                   Monday,6/10/2024,Gym then groceries\n\
                   Tuesday,6/11/2024,Quiet evening\n\
                   Tuesday,6/11/2024,Duplicate row\n";
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/entries/import")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let summary: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(summary, json!({ "imported": 2, "updated": 0, "skipped": 1 }));

        send(
            &app,
            Method::POST,
            "/api/entries",
            Some(&cookie),
            Some(json!({ "date": "2024-06-12", "mood": "great", "targetMet": true })),
        )
        .await;

        let r = send(
            &app,
            Method::GET,
            "/api/analytics?today=2024-06-12",
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json["totalEntries"], 3);
        assert_eq!(r.json["currentStreak"], 3);
        assert_eq!(r.json["targetMetPercentage"], 33);
        assert_eq!(r.json["gym"]["workedOut"], 1);
        assert_eq!(r.json["averageMood"], 5.0);
        assert_eq!(r.json["weeklyActivity"][1]["day"], "Mon");
        assert_eq!(r.json["weeklyActivity"][1]["hasEntry"], true);

        let r = send(&app, Method::GET, "/api/analytics?today=June", Some(&cookie), None).await;
        assert_eq!(r.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let r = send(&app(), Method::GET, "/api/health", None, None).await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json, json!({ "ok": true, "storage": "memory" }));
    }

    async fn post_csv(app: &Router, cookie: &str, csv: &'static str) -> Reply {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/entries/import")
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        Reply {
            status,
            headers,
            json: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        }
    }

    #[tokio::test]
    async fn import_fills_blank_days_and_keeps_written_ones() {
        let app = app();
        let cookie = signed_up(&app, "ivan").await;
        for body in [
            json!({ "date": "2024-06-10", "mood": "okay" }),
            json!({ "date": "2024-06-11", "reflection": "already written" }),
        ] {
            send(&app, Method::POST, "/api/entries", Some(&cookie), Some(body)).await;
        }

        let r = post_csv(
            &app,
            &cookie,
            "Physical Activity,Day,Date,Journal
             Yoga,Monday,6/10/2024,from the export
             ,Tuesday,6/11/2024,would overwrite
             ,Wednesday,6/12/2024,brand new
",
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json, json!({ "imported": 1, "updated": 1, "skipped": 1 }));

        let r = send(&app, Method::GET, "/api/entries/date/2024-06-10", Some(&cookie), None).await;
        assert_eq!(r.json["reflection"], "from the export");
        assert_eq!(r.json["gymNotes"], "Yoga");
        assert_eq!(r.json["mood"], "okay");

        let r = send(&app, Method::GET, "/api/entries/date/2024-06-11", Some(&cookie), None).await;
        assert_eq!(r.json["reflection"], "already written");

        let r = send(&app, Method::GET, "/api/entries", Some(&cookie), None).await;
        assert_eq!(r.json.as_array().unwrap().len(), 3);
    }

    /// Memory store whose single-entry `create` only works once.
    struct OneCreateOnly {
        inner: MemoryEntryRepo,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl EntryRepo for OneCreateOnly {
        async fn create(&self, user_id: Uuid, entry: NewEntry) -> anyhow::Result<JournalEntry> {
            if self.creates.fetch_add(1, Ordering::SeqCst) > 0 {
                anyhow::bail!("connection reset");
            }
            self.inner.create(user_id, entry).await
        }
        async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<JournalEntry>> {
            self.inner.get_by_id(id).await
        }
        async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<JournalEntry>> {
            self.inner.list_for_user(user_id).await
        }
        async fn summaries_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<EntrySummary>> {
            self.inner.summaries_for_user(user_id).await
        }
        async fn find_by_date(
            &self,
            user_id: Uuid,
            date: Date,
        ) -> anyhow::Result<Option<JournalEntry>> {
            self.inner.find_by_date(user_id, date).await
        }
        async fn update(&self, id: Uuid, patch: EntryPatch) -> anyhow::Result<Option<JournalEntry>> {
            self.inner.update(id, patch).await
        }
        async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
            self.inner.delete(id).await
        }
        async fn write_batch(
            &self,
            user_id: Uuid,
            create: Vec<NewEntry>,
            fill: Vec<(Uuid, EntryPatch)>,
        ) -> anyhow::Result<()> {
            self.inner.write_batch(user_id, create, fill).await
        }
    }

    #[tokio::test]
    async fn import_is_written_as_one_batch() {
        let mut state = AppState::fake();
        state.entries = Arc::new(OneCreateOnly {
            inner: MemoryEntryRepo::new(),
            creates: AtomicUsize::new(0),
        });
        let app = build_app(state);
        let cookie = signed_up(&app, "judy").await;

        let r = post_csv(
            &app,
            &cookie,
            "Day,Date,Journal
             Mon,6/10/2024,one
             Tue,6/11/2024,two
             Wed,6/12/2024,three
",
        )
        .await;
        assert_eq!(r.status, StatusCode::OK);
        assert_eq!(r.json["imported"], 3);

        let r = send(&app, Method::GET, "/api/entries", Some(&cookie), None).await;
        assert_eq!(r.json.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn oversized_json_body_is_rejected_with_413() {
        let config = AppConfig {
            max_body_bytes: 64,
            ..AppConfig::memory()
        };
        let app = build_app(AppState::in_memory(Arc::new(config)));
        let cookie = signed_up(&app, "kim").await;

        let r = send(
            &app,
            Method::POST,
            "/api/entries",
            Some(&cookie),
            Some(json!({ "date": "2024-06-12", "reflection": "x".repeat(500) })),
        )
        .await;
        assert_eq!(r.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(r.json["error"], "Request body too large");
    }

    #[tokio::test]
    async fn expired_session_cookie_is_rejected() {
        let state = AppState::fake();
        let app = build_app(state.clone());
        let cookie = signed_up(&app, "lena").await;
        let r = send(&app, Method::GET, "/api/auth/me", Some(&cookie), None).await;
        let user_id: Uuid = r.json["id"].as_str().unwrap().parse().unwrap();

        let token = state
            .sessions
            .create(user_id, time::Duration::seconds(-1))
            .await
            .unwrap();
        let expired = format!("{}={token}", state.config.session.cookie_name);

        let r = send(&app, Method::GET, "/api/auth/me", Some(&expired), None).await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
        assert_eq!(r.json["error"], "Session expired");

        let r = send(&app, Method::GET, "/api/entries", Some(&expired), None).await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    }
}
