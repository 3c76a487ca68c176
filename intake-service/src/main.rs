use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use health_intake::{
    InMemorySessionStorage, IntakeConfig, IntakeError, IntakeRunner, RiskAssessment,
    SessionFactory, SessionSnapshot, TurnOutcome,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    runner: IntakeRunner,
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    session_id: Option<String>,
    content: String,
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    session_id: String,
    prompt_text: String,
    acknowledgment_text: Option<String>,
    is_complete: bool,
    latest_risk_assessment: Option<RiskAssessment>,
}

impl From<TurnOutcome> for ExecuteResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            session_id: outcome.session_id,
            prompt_text: outcome.prompt_text,
            acknowledgment_text: outcome.acknowledgment_text,
            is_complete: outcome.is_complete,
            latest_risk_assessment: outcome.latest_risk_assessment,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "intake_service=debug,health_intake=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IntakeConfig::from_env()?;
    match &config.reasoning {
        Some(reasoning) => info!(model = %reasoning.model, "delegated risk scoring enabled"),
        None => warn!("OPENROUTER_API_KEY not set, using deterministic risk scoring"),
    }

    let factory = SessionFactory::from_config(config)?;
    let runner = IntakeRunner::new(factory, Arc::new(InMemorySessionStorage::new()));
    let app = app(AppState { runner });

    let addr = std::env::var("SERVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/session", post(start_session))
        .route("/execute", post(execute_message))
        .route("/session/{id}", get(get_session).delete(delete_session))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn status_for(err: &IntakeError) -> StatusCode {
    match err {
        IntakeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        IntakeError::SessionClosed(_) => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn health_check() -> &'static str {
    "OK"
}

async fn start_session(
    State(state): State<AppState>,
) -> Result<Json<ExecuteResponse>, StatusCode> {
    match state.runner.start().await {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            error!("Failed to start session: {}", e);
            Err(status_for(&e))
        }
    }
}

async fn execute_message(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, StatusCode> {
    info!(session_id = ?request.session_id, "Execute request");

    if request.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state
        .runner
        .run(request.session_id.as_deref(), &request.content)
        .await
    {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            error!("Failed to process message: {}", e);
            Err(status_for(&e))
        }
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    match state.runner.snapshot(&session_id).await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            if !matches!(e, IntakeError::SessionNotFound(_)) {
                error!("Failed to get session: {}", e);
            }
            Err(status_for(&e))
        }
    }
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    match state.runner.close(&session_id).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => status_for(&e),
    }
}
