use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use poker_core::auth::Authorizer;
use poker_core::clock::Clock;
use poker_engine::SessionService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::{handlers, stream};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SessionService>,
    pub auth: Arc<dyn Authorizer>,
    pub keepalive: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/session", get(handlers::get_session))
        .route("/api/session/open", post(handlers::open_session))
        .route("/api/session/close", post(handlers::close_session))
        .route("/api/session/vote", post(handlers::vote))
        .route("/api/session/reset", post(handlers::reset_session))
        .route("/api/session/unmask", post(handlers::unmask_session))
        .route("/ws/session", get(stream::ws_session))
        .route("/ws/presence", get(stream::ws_presence))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle with the bound port.
pub async fn start(
    config: ServerConfig,
    auth: Arc<dyn Authorizer>,
) -> Result<ServerHandle, std::io::Error> {
    start_with_clock(config, auth, Clock::new()).await
}

/// Like [`start`], with an externally controlled clock.
pub async fn start_with_clock(
    config: ServerConfig,
    auth: Arc<dyn Authorizer>,
    clock: Clock,
) -> Result<ServerHandle, std::io::Error> {
    let service = Arc::new(SessionService::new(clock, config.service_settings()));

    let state = AppState {
        service,
        auth,
        keepalive: config.keepalive,
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "poker server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use poker_core::auth::Role;
    use reqwest::StatusCode;

    use super::*;
    use crate::auth::StaticAuthorizer;

    fn test_auth() -> Arc<dyn Authorizer> {
        Arc::new(
            StaticAuthorizer::new()
                .with_user("ann", "ann", Role::Voter)
                .with_user("bob", "bob", Role::Voter)
                .with_user("sm", "sm", Role::ScrumMaster),
        )
    }

    async fn serve() -> ServerHandle {
        let config = ServerConfig {
            port: 0, // random port
            ..Default::default()
        };
        start(config, test_auth()).await.unwrap()
    }

    fn token(name: &str) -> String {
        StaticAuthorizer::token_for(name, name)
    }

    fn api(port: u16, path: &str) -> String {
        format!("http://127.0.0.1:{port}{path}")
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = serve().await;
        assert!(handle.port > 0);

        let resp = reqwest::get(api(handle.port, "/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn requests_without_credentials_are_rejected() {
        let handle = serve().await;
        let client = reqwest::Client::new();

        let resp = client
            .get(api(handle.port, "/api/session"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = client
            .get(api(handle.port, "/api/session"))
            .header("Authorization", "Bearer bm90LXZhbGlk")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn full_session_flow_over_http() {
        let handle = serve().await;
        let client = reqwest::Client::new();
        let url = |path: &str| api(handle.port, path);

        // open as ann
        let resp = client
            .post(url("/api/session/open"))
            .bearer_auth(token("ann"))
            .json(&serde_json::json!({ "voters": ["ann", "bob"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let view: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(view["chain"]["leader"], "ann");

        // a second open conflicts
        let resp = client
            .post(url("/api/session/open"))
            .bearer_auth(token("bob"))
            .json(&serde_json::json!({ "voters": ["bob"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // ann votes; bob sees a masked board
        let resp = client
            .post(url("/api/session/vote"))
            .bearer_auth(token("ann"))
            .json(&serde_json::json!({ "type": "cast", "score": 3 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = client
            .get(url("/api/session"))
            .bearer_auth(token("bob"))
            .send()
            .await
            .unwrap();
        let view: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(view["chain"]["voters"]["ann"]["state"], "hidden");
        assert_eq!(view["chain"]["voters"]["bob"]["state"], "not_voted");

        // the scrum master sees everything
        let resp = client
            .get(url("/api/session"))
            .bearer_auth(token("sm"))
            .send()
            .await
            .unwrap();
        let view: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(view["chain"]["voters"]["ann"]["state"], "voted");
        assert_eq!(view["chain"]["voters"]["ann"]["score"], 3);

        // bob completes the round; the result is public
        let resp = client
            .post(url("/api/session/vote"))
            .bearer_auth(token("bob"))
            .json(&serde_json::json!({ "type": "cast", "score": 5 }))
            .send()
            .await
            .unwrap();
        let view: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(view["chain"]["result"]["average"], 4.0);

        // only the leader closes
        let resp = client
            .post(url("/api/session/close"))
            .bearer_auth(token("bob"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = client
            .post(url("/api/session/close"))
            .bearer_auth(token("ann"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let view: serde_json::Value = resp.json().await.unwrap();
        assert!(view["chain"].is_null());
    }

    #[tokio::test]
    async fn invalid_vote_payload_is_bad_request() {
        let handle = serve().await;
        let client = reqwest::Client::new();

        client
            .post(api(handle.port, "/api/session/open"))
            .bearer_auth(token("ann"))
            .json(&serde_json::json!({ "voters": ["ann"] }))
            .send()
            .await
            .unwrap();

        let resp = client
            .post(api(handle.port, "/api/session/vote"))
            .bearer_auth(token("ann"))
            .json(&serde_json::json!({ "type": "cast", "score": -2 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn build_router_creates_routes() {
        let service = Arc::new(SessionService::new(
            Clock::new(),
            ServerConfig::default().service_settings(),
        ));
        let state = AppState {
            service,
            auth: test_auth(),
            keepalive: Duration::from_secs(5),
        };
        let _router = build_router(state);
    }
}
