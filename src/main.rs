//! 마작 점수 기록 서버
//!
//! 방 단위 점수 이동/정산과 실시간 방 이벤트 브로드캐스트

mod config;
mod handlers;
mod hub;
mod ledger;
mod protocol;
mod state;

use anyhow::Context;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use config::Config;
use handlers::ApiError;
use hub::Hub;
use ledger::MemoryStore;
use protocol::{unix_now, ViewerParams};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (hub, hub_task) = Hub::spawn();
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(config.clone(), store, hub.clone()));

    let app = app(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Mahjong score server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws?room_id=<id>&user_id=<id>", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .context("server error")?;

    let _ = hub_task.await;
    tracing::info!("Server stopped");
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    // CORS 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/rooms", post(handlers::create_room))
        .route(
            "/api/rooms/:room_id",
            get(handlers::get_room).put(handlers::rename_room),
        )
        .route(
            "/api/rooms/code/:room_code",
            get(handlers::get_room_by_code),
        )
        .route(
            "/api/rooms/:room_id/players",
            post(handlers::join_room).put(handlers::update_player),
        )
        .route(
            "/api/rooms/:room_id/transfers",
            post(handlers::transfer_score),
        )
        .route("/api/rooms/:room_id/settle", post(handlers::settle_room))
        .route("/api/users/:user_id/rooms", get(handlers::user_rooms))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Ctrl-C / SIGTERM 대기 후 허브 정리
async fn shutdown_signal(hub: Hub) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received, closing viewer connections");
    hub.shutdown().await;
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Mahjong Score Server</h1>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.hub.stats().await;
    Json(serde_json::json!({
        "status": "ok",
        "server": "mahjong-score-rs",
        "timestamp": unix_now(),
        "connections": stats.connections,
        "rooms": stats.rooms,
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ViewerParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    // 없는 방에는 연결하지 않음
    state.store.room(params.room_id).await?;

    let hub = state.hub.clone();
    let config = state.config.hub.clone();

    Ok(ws
        .max_message_size(config.max_message_size)
        .on_upgrade(move |socket| {
            handlers::serve_viewer(socket, hub, config, params.room_id, params.user_id)
        })
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let (hub, _task) = Hub::spawn();
        let config = Config {
            port: 0,
            host: "127.0.0.1".to_string(),
            hub: Default::default(),
            ledger: Default::default(),
            log_level: "debug".to_string(),
        };
        let state = AppState::new(config, Arc::new(MemoryStore::new()), hub);
        app(Arc::new(state))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_room_lifecycle() {
        let app = test_app();

        let create = json!({
            "room_name": "friday",
            "creator": { "user_id": 1, "nickname": "ann" },
        });
        let (status, room) = call(&app, Method::POST, "/api/rooms", Some(create)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(room["status"], "open");
        let room_id = room["id"].as_i64().unwrap();
        let code = room["code"].as_str().unwrap().to_string();

        let uri = format!("/api/rooms/code/{code}");
        let (status, found) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["id"], room_id);

        let (status, joined) = call(
            &app,
            Method::POST,
            &format!("/api/rooms/{room_id}/players"),
            Some(json!({ "user_id": 2, "nickname": "bo" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(joined["already_joined"], false);

        let transfers = format!("/api/rooms/{room_id}/transfers");
        let (status, _) = call(
            &app,
            Method::POST,
            &transfers,
            Some(json!({ "from_user_id": 2, "to_user_id": 1, "amount": 100 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            Method::POST,
            &transfers,
            Some(json!({ "from_user_id": 2, "to_user_id": 1, "amount": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");

        let uri = format!("/api/rooms/{room_id}");
        let (status, detail) = call(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["players"][0]["current_score"], 100);
        assert_eq!(detail["players"][1]["current_score"], -100);
        assert_eq!(detail["players"][1]["nickname"], "bo");
        assert_eq!(detail["transfers"].as_array().unwrap().len(), 1);
        assert_eq!(detail["viewers"], 0);

        let uri = format!("/api/rooms/{room_id}/settle");
        let (status, settlements) = call(&app, Method::POST, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            settlements,
            json!([{
                "room_id": room_id,
                "from_user_id": 2,
                "to_user_id": 1,
                "amount": 100,
                "kind": "settlement",
                "created_at": settlements[0]["created_at"].clone(),
            }])
        );

        let (status, body) = call(
            &app,
            Method::POST,
            &transfers,
            Some(json!({ "from_user_id": 1, "to_user_id": 2, "amount": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "room_closed");
    }

    #[tokio::test]
    async fn test_user_room_history() {
        let app = test_app();

        for name in ["first", "second"] {
            let create = json!({ "room_name": name, "creator": { "user_id": 7 } });
            let (status, _) = call(&app, Method::POST, "/api/rooms", Some(create)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, rooms) = call(&app, Method::GET, "/api/users/7/rooms", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rooms.as_array().unwrap().len(), 2);
        assert_eq!(rooms[0]["name"], "second");
        assert_eq!(rooms[0]["status"], "open");
        assert_eq!(rooms[0]["player_count"], 1);
        assert_eq!(rooms[0]["transfer_count"], 0);
        assert_eq!(rooms[0]["current_score"], 0);

        let uri = "/api/users/7/rooms?page=2&page_size=1";
        let (status, page) = call(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page.as_array().unwrap().len(), 1);
        assert_eq!(page[0]["name"], "first");

        let uri = "/api/users/7/rooms?page=0&page_size=-3";
        let (status, fallback) = call(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fallback.as_array().unwrap().len(), 2);

        let (status, none) = call(&app, Method::GET, "/api/users/8/rooms", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(none, json!([]));
    }

    #[tokio::test]
    async fn test_unknown_room() {
        let app = test_app();

        let (status, body) = call(&app, Method::GET, "/api/rooms/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");

        let (status, _) = call(&app, Method::POST, "/api/rooms/999/settle", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_room_name_rejected() {
        let app = test_app();
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/rooms",
            Some(json!({ "room_name": "  ", "creator": { "user_id": 1 } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
