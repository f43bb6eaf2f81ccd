//! Axum route handlers for the lexicon HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`       - Returns `{"status": "ok", "env": ..., "version": ...}`
//! - `POST /api/analyze`  - JSON analysis, see [`AnalyzeRequest`]
//! - `GET  /`, `GET /chat` - Analysis page
//! - `POST /web/analyze`  - Form post, returns an HTML fragment

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tera::Tera;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::web;
use crate::config::AppEnv;
use crate::core::{
    AnalyzeRequest, AnalyzeResponse, AppError, ProcessingResult, Source, WordValidator,
};
use crate::service::LinguisticService;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub service: LinguisticService,
    pub templates: Arc<Tera>,
    pub app_env: AppEnv,
}

impl AppState {
    pub fn new(service: LinguisticService, app_env: AppEnv) -> Result<Self, tera::Error> {
        Ok(Self {
            service,
            templates: Arc::new(web::templates()?),
            app_env,
        })
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/", get(web::index_handler))
        .route("/chat", get(web::index_handler))
        .route("/web/analyze", post(web::analyze_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run an analysis on its own task so a client disconnect cannot cancel the
/// cache and history writes.
pub(crate) async fn run_detached(
    service: &LinguisticService,
    text: String,
    source: Source,
) -> Result<ProcessingResult, AppError> {
    let service = service.clone();
    tokio::spawn(async move { service.analyze(&text, source).await })
        .await
        .map_err(|e| {
            AppError::internal("Произошла внутренняя ошибка сервера")
                .with_detail("error", e.to_string())
        })
}

/// GET /health - liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "env": state.app_env.as_str(),
        "version": crate::VERSION,
    }))
}

/// POST /api/analyze
///
/// Request:  `{"text": "счастье", "request_type"?: "synonym", "language"?: "ru"}`
/// Response: [`AnalyzeResponse`]. Generation failures are still 200 with
/// `status = "failed"`; only malformed input is rejected with 422.
async fn analyze_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::validation("Ошибка валидации данных").with_detail("error", rejection.body_text())
    })?;
    WordValidator::validate_word(&request.text)?;

    tracing::info!(text = %request.text, "API analysis request");
    let started = Instant::now();
    let outcome = run_detached(&state.service, request.text.clone(), Source::Api).await?;

    Ok(Json(AnalyzeResponse::new(
        request.text,
        request.request_type,
        outcome,
        Some(started.elapsed().as_secs_f64()),
    )))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Association, ProcessingStatus};
    use crate::generator::{AssociationGenerator, GenerationError};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    struct FixedGenerator;

    #[async_trait]
    impl AssociationGenerator for FixedGenerator {
        async fn generate(&self, word: &str) -> Result<Vec<Association>, GenerationError> {
            match word {
                "счастье" => Ok(vec![
                    Association::synonym("радость"),
                    Association::antonym("горе"),
                ]),
                _ => Err(GenerationError::not_found(word)),
            }
        }
    }

    fn test_app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = LinguisticService::new(store.clone(), store.clone(), Arc::new(FixedGenerator));
        let state = AppState::new(service, AppEnv::Testing).unwrap();
        (app_router(state), store)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn text_body(response: axum::response::Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = test_app();

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["env"], "testing");
        assert_eq!(json["version"], crate::VERSION);
    }

    #[tokio::test]
    async fn test_api_analyze_completed() {
        let (app, store) = test_app();

        let response = app
            .oneshot(post_json(
                "/api/analyze",
                serde_json::json!({"text": "Счастье", "request_type": "synonym"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["original_text"], "Счастье");
        assert_eq!(json["request_type"], "synonym");
        assert_eq!(json["status"], "completed");
        assert_eq!(
            json["result"],
            serde_json::json!([
                {"word": "радость", "type": "synonym"},
                {"word": "горе", "type": "antonym"},
            ])
        );
        assert!(json["error"].is_null());
        assert!(json["execution_time"].as_f64().unwrap() >= 0.0);
        assert!(json["request_id"].as_str().is_some());

        assert_eq!(store.cache_len(), 1);
        assert_eq!(store.history()[0].source, Source::Api);
    }

    #[tokio::test]
    async fn test_api_analyze_unknown_word() {
        let (app, store) = test_app();

        let response = app
            .oneshot(post_json("/api/analyze", serde_json::json!({"text": "фдыва"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "failed");
        assert!(json["result"].is_null());
        assert!(json["error"].as_str().unwrap().contains("фдыва"));
        assert_eq!(store.cache_len(), 0);
        assert_eq!(store.history().len(), 1);
    }

    #[tokio::test]
    async fn test_api_rejects_latin() {
        let (app, store) = test_app();

        let response = app
            .oneshot(post_json("/api/analyze", serde_json::json!({"text": "happiness"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
        assert_eq!(json["error"]["details"]["field"], "text");
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_api_rejects_missing_text() {
        let (app, _) = test_app();

        let response = app
            .oneshot(post_json("/api/analyze", serde_json::json!({"language": "ru"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_index_pages() {
        for uri in ["/", "/chat"] {
            let (app, _) = test_app();
            let response = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let html = text_body(response).await;
            assert!(html.contains("hx-post=\"/web/analyze\""));
        }
    }

    #[tokio::test]
    async fn test_web_analyze_fragment() {
        let (app, store) = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/web/analyze")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from("text=%D1%81%D1%87%D0%B0%D1%81%D1%82%D1%8C%D0%B5"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = text_body(response).await;
        assert!(html.contains("<li>радость</li>"));
        assert_eq!(store.history()[0].source, Source::Web);
    }

    #[tokio::test]
    async fn test_web_analyze_rejects_latin_without_calling_service() {
        let (app, store) = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/web/analyze")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from("text=hello"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = text_body(response).await;
        assert!(html.contains("используйте только кириллицу"));
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_run_detached() {
        let store = Arc::new(MemoryStore::new());
        let service = LinguisticService::new(store.clone(), store.clone(), Arc::new(FixedGenerator));

        let outcome = run_detached(&service, "счастье".to_string(), Source::Web)
            .await
            .unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Completed);
    }
}
