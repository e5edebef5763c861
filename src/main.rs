mod config;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use http::header;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::PipelineError;
use crate::models::{ContentType, Project, ProjectInput, SessionStatus};
use crate::services::export;
use crate::services::llm::LLMClient;
use crate::services::pipeline::Orchestrator;
use crate::services::progress::Progress;

#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Config::from_env().context("invalid configuration")?;
    if config.llm.api_key.is_none() {
        tracing::warn!("no LLM API key configured; outline and generation requests will be refused");
    }

    // The client doubles as the credential probe for its own key
    let llm_client = Arc::new(LLMClient::new(config.llm.clone()));
    let orchestrator = Orchestrator::new(llm_client.clone(), llm_client, config.pipeline);

    let app = app(AppState { orchestrator });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/session", get(session))
        .route("/session/start", post(start))
        .route("/session/input", post(submit_input))
        .route("/session/confirm", post(confirm_outline))
        .route("/session/restart", post(restart))
        .route("/session/export/markdown", get(export_markdown))
        .route("/session/export/epub", get(export_epub))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

async fn index() -> Html<&'static str> {
    Html(
        r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>Obra Prima</title>
        <meta charset="utf-8">
        <style>
            body { font-family: Arial, sans-serif; margin: 40px; }
            .info-box { background-color: #f0f8ff; padding: 20px; border-radius: 8px; margin: 20px 0; }
            .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; }
        </style>
    </head>
    <body>
        <h1>Obra Prima</h1>

        <div class="info-box">
            <h2>Service Information</h2>
            <p>Turns a topic, an audience and a tone into a complete e-book or online course:
            outline first, then every chapter, with an AI generated cover.</p>
        </div>

        <h2>Available Endpoints:</h2>
        <div class="endpoint">GET /session - Current step, project and progress</div>
        <div class="endpoint">POST /session/start - {"type": "EBOOK" | "COURSE"}</div>
        <div class="endpoint">POST /session/input - {"topic", "audience", "tone"}</div>
        <div class="endpoint">POST /session/confirm - Approve the outline and write the project</div>
        <div class="endpoint">POST /session/restart - Discard the project</div>
        <div class="endpoint">GET /session/export/markdown - Download as Markdown</div>
        <div class="endpoint">GET /session/export/epub - Download as EPUB</div>
        <div class="endpoint">GET /health - Health check</div>
    </body>
    </html>
    "#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct SessionView {
    status: SessionStatus,
    project: Option<Project>,
    progress: Option<Progress>,
}

impl SessionView {
    fn of(orchestrator: &Orchestrator) -> Json<Self> {
        let state = orchestrator.snapshot();
        let progress = state.progress();
        Json(SessionView {
            status: state.status,
            project: state.project,
            progress,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    #[serde(rename = "type")]
    content_type: ContentType,
}

enum ApiError {
    Pipeline(PipelineError),
    Internal(anyhow::Error),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Pipeline(e) => {
                let status = match &e {
                    PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    PipelineError::InvalidTransition { .. }
                    | PipelineError::Busy
                    | PipelineError::NotReady
                    | PipelineError::Discarded => StatusCode::CONFLICT,
                    PipelineError::CredentialUnavailable { .. } => StatusCode::PRECONDITION_FAILED,
                    PipelineError::StructuralFailure(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.user_message())
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

async fn session(State(state): State<AppState>) -> Json<SessionView> {
    SessionView::of(&state.orchestrator)
}

async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<SessionView>, ApiError> {
    state.orchestrator.start(request.content_type)?;
    Ok(SessionView::of(&state.orchestrator))
}

async fn submit_input(
    State(state): State<AppState>,
    Json(input): Json<ProjectInput>,
) -> Result<Json<SessionView>, ApiError> {
    state.orchestrator.submit_input(input).await?;
    Ok(SessionView::of(&state.orchestrator))
}

async fn confirm_outline(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let run = state.orchestrator.begin_generation().await?;
    let project_id = run.project_id();
    tokio::spawn(async move {
        let outcome = run.run().await;
        tracing::debug!(%project_id, ?outcome, "generation run finished");
    });
    Ok((StatusCode::ACCEPTED, SessionView::of(&state.orchestrator)))
}

async fn restart(State(state): State<AppState>) -> Json<SessionView> {
    state.orchestrator.restart();
    SessionView::of(&state.orchestrator)
}

fn attachment(content_type: &str, file_name: &str) -> [(header::HeaderName, String); 2] {
    [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        ),
    ]
}

async fn export_markdown(State(state): State<AppState>) -> Result<Response, ApiError> {
    let project = state.orchestrator.finished_project()?;
    let file_name = utils::export_file_name(&project.title, "md");
    let body = export::to_markdown(&project);
    Ok((attachment("text/markdown; charset=utf-8", &file_name), body).into_response())
}

async fn export_epub(State(state): State<AppState>) -> Result<Response, ApiError> {
    let project = state.orchestrator.finished_project()?;
    let file_name = utils::export_file_name(&project.title, "epub");
    let bytes = export::to_epub(&project).map_err(ApiError::Internal)?;
    Ok((attachment("application/epub+zip", &file_name), bytes).into_response())
}
