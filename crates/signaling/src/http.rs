//! HTTP-Routen fuer Connect/Disconnect und den WebSocket-Endpunkt
//!
//! ```text
//! POST /api/speech/connect     {"userId"} -> 200 {"sessionId","opponentId"}
//!                                          | 400 already-pending / already-connected
//!                                          | 503 match-failed-retry
//! POST /api/speech/disconnect  {"userId"} -> 200 | 400 not-connected
//! GET  /api/speech/ws                      -> WebSocket-Upgrade
//! ```

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use parley_core::UserId;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::SessionEngine;
use crate::error::{SignalingError, SignalingResult};
use crate::ws::ws_handler;

/// Request-Body fuer connect und disconnect
#[derive(Debug, Deserialize)]
pub struct BenutzerAnfrage {
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

/// Erstellt den /api/speech-Router
pub fn speech_router(engine: Arc<SessionEngine>) -> Router {
    Router::new()
        .route("/api/speech/connect", post(verbinden))
        .route("/api/speech/disconnect", post(trennen))
        .route("/api/speech/ws", get(ws_handler))
        .with_state(engine)
}

fn anfrage_lesen(
    body: Result<Json<BenutzerAnfrage>, JsonRejection>,
) -> SignalingResult<BenutzerAnfrage> {
    body.map(|Json(anfrage)| anfrage)
        .map_err(|e| SignalingError::protokoll(e.body_text()))
}

async fn verbinden(
    State(engine): State<Arc<SessionEngine>>,
    body: Result<Json<BenutzerAnfrage>, JsonRejection>,
) -> SignalingResult<Json<Value>> {
    let anfrage = anfrage_lesen(body)?;
    let verbindung = engine.verbinden(anfrage.user_id).await?;
    Ok(Json(json!({
        "sessionId": verbindung.session_id,
        "opponentId": verbindung.gegner,
    })))
}

async fn trennen(
    State(engine): State<Arc<SessionEngine>>,
    body: Result<Json<BenutzerAnfrage>, JsonRejection>,
) -> SignalingResult<Json<Value>> {
    let anfrage = anfrage_lesen(body)?;
    let session_id = engine.trennen(&anfrage.user_id).await?;
    Ok(Json(json!({
        "status": "ok",
        "sessionId": session_id,
    })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router() -> (Router, Arc<SessionEngine>) {
        let engine = Arc::new(SessionEngine::neu(EngineConfig {
            aufnahme: None,
            ..EngineConfig::default()
        }));
        (speech_router(Arc::clone(&engine)), engine)
    }

    fn anfrage(pfad: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(pfad)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn antwort_json(antwort: axum::response::Response) -> (StatusCode, Value) {
        let status = antwort.status();
        let bytes = axum::body::to_bytes(antwort.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn connect_paart_zwei_benutzer() {
        let (app, engine) = router();

        let app_a = app.clone();
        let a = tokio::spawn(async move {
            app_a
                .oneshot(anfrage("/api/speech/connect", r#"{"userId":"alice"}"#))
                .await
                .unwrap()
        });
        let alice = UserId::neu("alice").unwrap();
        while !engine.queue().ist_wartend(&alice) {
            tokio::task::yield_now().await;
        }

        let b = app
            .oneshot(anfrage("/api/speech/connect", r#"{"userId":"bob"}"#))
            .await
            .unwrap();
        let (status_b, json_b) = antwort_json(b).await;
        let (status_a, json_a) = antwort_json(a.await.unwrap()).await;

        assert_eq!(status_a, StatusCode::OK);
        assert_eq!(status_b, StatusCode::OK);
        assert_eq!(json_a["sessionId"], json_b["sessionId"]);
        assert_eq!(json_a["opponentId"], "bob");
        assert_eq!(json_b["opponentId"], "alice");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_ohne_gegner_503() {
        let (app, _engine) = router();
        let antwort = app
            .oneshot(anfrage("/api/speech/connect", r#"{"userId":"alice"}"#))
            .await
            .unwrap();
        let (status, json) = antwort_json(antwort).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "match-failed-retry");
    }

    #[tokio::test]
    async fn disconnect_ohne_session_400() {
        let (app, _engine) = router();
        let antwort = app
            .oneshot(anfrage("/api/speech/disconnect", r#"{"userId":"alice"}"#))
            .await
            .unwrap();
        let (status, json) = antwort_json(antwort).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "not-connected");
    }

    #[tokio::test]
    async fn disconnect_beendet_session() {
        let (app, engine) = router();
        let a = UserId::neu("alice").unwrap();
        let b = UserId::neu("bob").unwrap();
        let sid = engine.registry().session_erstellen(&a, &b).unwrap();

        let antwort = app
            .oneshot(anfrage("/api/speech/disconnect", r#"{"userId":"bob"}"#))
            .await
            .unwrap();
        let (status, json) = antwort_json(antwort).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sessionId"], sid.to_string());
        assert_eq!(engine.registry().session_von_user(&a), None);
    }

    #[tokio::test]
    async fn ungueltiger_body_400() {
        let (app, _engine) = router();
        let antwort = app
            .oneshot(anfrage("/api/speech/connect", r#"{"userId":"../etc"}"#))
            .await
            .unwrap();
        let (status, json) = antwort_json(antwort).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid-request");
    }
}
