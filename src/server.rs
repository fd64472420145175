//! HTTP API.
//!
//! Exposes the chatbot over a small JSON API consumed by the portfolio
//! frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Static service info |
//! | `GET`  | `/api/chat/status` | Readiness of the knowledge base |
//! | `POST` | `/api/chat` | Ask the chatbot a question |
//! | `POST` | `/api/chat/initialize` | Rebuild the knowledge base from fresh sources |
//! | `GET`  | `/api/projects` | Categorized, filtered project listing |
//!
//! # Behavior contract
//!
//! `POST /api/chat` returns 503 while the knowledge base is still being
//! built. Generation failures come back as HTTP 200 with `success: false`
//! and a human-readable `error` — the frontend renders them as a chat
//! bubble rather than a broken page.
//!
//! # CORS
//!
//! The configured frontend origins are allowed with credentials; methods
//! and headers mirror the request.

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::github::GithubClient;
use crate::models::RepoRecord;
use crate::projects;
use crate::session::ChatSession;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    session: Arc<ChatSession>,
}

/// Start the HTTP server and kick off knowledge-base initialization in the
/// background. Runs until the process is terminated.
pub async fn run_server(config: Arc<Config>, session: Arc<ChatSession>) -> Result<()> {
    let state = AppState {
        config: config.clone(),
        session: session.clone(),
    };

    // The original service initializes at startup; a failure here degrades
    // to the "initializing" placeholder instead of crashing the server.
    tokio::spawn(startup_initialize(config.clone(), session));

    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in &config.server.allowed_origins {
        origins.push(
            origin
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid CORS origin: {}", origin))?,
        );
    }
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/api/chat/status", get(handle_status))
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/initialize", post(handle_initialize))
        .route("/api/projects", get(handle_projects))
        .layer(cors)
        .with_state(state);

    info!("chat API listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn startup_initialize(config: Arc<Config>, session: Arc<ChatSession>) {
    if session.restore().await.unwrap_or(false) {
        return;
    }
    let repos = fetch_repositories(&config).await;
    match session.initialize(&repos).await {
        Ok(summary) => info!(
            "startup initialization complete ({} repos, {} chunks)",
            summary.repos, summary.chunks
        ),
        Err(e) => error!("startup initialization failed: {:#}", e),
    }
}

/// Fetch repositories, degrading to an empty list on any failure so the
/// chatbot still comes up with profile-only knowledge.
async fn fetch_repositories(config: &Config) -> Vec<RepoRecord> {
    if config.github.username.trim().is_empty() {
        warn!("github.username not configured; knowledge base will use profile data only");
        return Vec::new();
    }
    let client = match GithubClient::from_env(&config.github.username) {
        Ok(client) => client,
        Err(e) => {
            warn!("could not build GitHub client: {}", e);
            return Vec::new();
        }
    };
    match client.list_repositories().await {
        Ok(repos) => repos,
        Err(e) => {
            warn!("repository fetch failed, continuing without repos: {:#}", e);
            Vec::new()
        }
    }
}

// ============ Payloads ============

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    status: &'static str,
    docs: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    initialized: bool,
    message: &'static str,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct InitializeResponse {
    message: String,
    success: bool,
}

/// Error body for non-2xx responses.
#[derive(Serialize)]
struct Detail {
    detail: String,
}

fn detail(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Detail>) {
    (
        status,
        Json(Detail {
            detail: message.into(),
        }),
    )
}

// ============ Handlers ============

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Portfolio AI Chatbot API",
        status: "running",
        docs: "/docs",
    })
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let initialized = state.session.is_ready().await;
    Json(StatusResponse {
        initialized,
        message: if initialized {
            "Chatbot is ready"
        } else {
            "Chatbot is initializing..."
        },
    })
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<Detail>)> {
    if !state.session.is_ready().await {
        return Err(detail(
            StatusCode::SERVICE_UNAVAILABLE,
            "Chatbot is still initializing. Please try again in a moment.",
        ));
    }

    match state.session.ask(&request.message).await {
        Ok(response) => Ok(Json(ChatResponse {
            response,
            success: true,
            error: None,
        })),
        Err(e) => {
            error!("generation failed: {:#}", e);
            Ok(Json(ChatResponse {
                response: String::new(),
                success: false,
                error: Some(format!("Failed to generate response: {}", e)),
            }))
        }
    }
}

async fn handle_initialize(
    State(state): State<AppState>,
) -> Result<Json<InitializeResponse>, (StatusCode, Json<Detail>)> {
    let repos = fetch_repositories(&state.config).await;

    match state.session.initialize(&repos).await {
        Ok(summary) if summary.already_initialized => Ok(Json(InitializeResponse {
            message: "Knowledge base already initialized".to_string(),
            success: true,
        })),
        Ok(summary) => Ok(Json(InitializeResponse {
            message: format!("Initialized with {} repositories", summary.repos),
            success: true,
        })),
        Err(e) => {
            error!("initialization failed: {:#}", e);
            Err(detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[derive(Deserialize)]
struct ProjectsQuery {
    category: Option<String>,
    search: Option<String>,
    sort: Option<String>,
    min_stars: Option<u64>,
}

#[derive(Serialize)]
struct ProjectsResponse {
    projects: Vec<projects::ProjectSummary>,
    total: usize,
}

async fn handle_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectsQuery>,
) -> Result<Json<ProjectsResponse>, (StatusCode, Json<Detail>)> {
    if state.config.github.username.trim().is_empty() {
        return Err(detail(
            StatusCode::SERVICE_UNAVAILABLE,
            "github.username is not configured",
        ));
    }

    let client = GithubClient::from_env(&state.config.github.username)
        .map_err(|e| detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let repos = client
        .list_repositories()
        .await
        .map_err(|e| detail(StatusCode::BAD_GATEWAY, format!("repository fetch failed: {}", e)))?;

    let rules = &state.config.projects.categories;
    let mut filtered = projects::filter_repositories(
        &repos,
        rules,
        query.category.as_deref(),
        query.search.as_deref(),
        query.min_stars.unwrap_or(0),
    );
    projects::sort_repositories(&mut filtered, query.sort.as_deref().unwrap_or("updated"));
    let summaries = projects::summarize(&filtered, rules, &state.config.profile.featured);

    let total = summaries.len();
    Ok(Json(ProjectsResponse {
        projects: summaries,
        total,
    }))
}
