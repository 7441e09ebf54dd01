// Account Directory - Preview Server
// Serves a built site plus a read-only JSON API over the same artifacts

use account_directory::{
    normalize_identifier, read_detail, read_listing, read_stats, AccountSummary,
    AggregateStatistics, EntityRecord,
};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use clap::Parser;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "directory-server", about = "Preview a built account directory site")]
struct Args {
    /// Site directory produced by `account-directory build`
    #[arg(long, default_value = "site")]
    site_dir: PathBuf,

    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,
}

/// Everything the API serves, read once at startup
struct Snapshot {
    accounts: Vec<AccountSummary>,
    stats: AggregateStatistics,
    details: HashMap<String, EntityRecord>,
}

impl Snapshot {
    fn load(site_dir: &std::path::Path) -> Result<Self> {
        let listing = read_listing(site_dir)?;
        let stats = read_stats(site_dir)?;

        let mut details = HashMap::new();
        for summary in &listing.accounts {
            match read_detail(site_dir, &summary.identifier) {
                Ok(record) => {
                    details.insert(summary.identifier.clone(), record);
                }
                Err(e) => warn!(identifier = %summary.identifier, error = %e, "detail missing"),
            }
        }

        Ok(Snapshot {
            accounts: listing.accounts,
            stats,
            details,
        })
    }
}

type AppState = Arc<Snapshot>;

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.stats.clone()))
}

/// GET /api/accounts
async fn get_accounts(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.accounts.clone()))
}

/// GET /api/accounts/:id
async fn get_account(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> impl IntoResponse {
    let key = normalize_identifier(&identifier);
    match state.details.get(&key) {
        Some(record) => (StatusCode::OK, Json(ApiResponse::ok(record.clone()))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<EntityRecord>::err(format!(
                "No account @{}",
                key
            ))),
        )
            .into_response(),
    }
}

fn router(state: AppState, site_dir: PathBuf) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/accounts", get(get_accounts))
        .route("/accounts/:id", get(get_account))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(site_dir))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!("🌐 Account Directory - Preview Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let snapshot = Snapshot::load(&args.site_dir).with_context(|| {
        format!(
            "No built site at {:?}, run `account-directory build` first",
            args.site_dir
        )
    })?;
    info!(
        accounts = snapshot.accounts.len(),
        details = snapshot.details.len(),
        "site loaded"
    );

    let app = router(Arc::new(snapshot), args.site_dir.clone());

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", args.addr))?;

    println!("\n🚀 Server running on http://{}", args.addr);
    println!("   API:  http://{}/api/accounts", args.addr);
    println!("   Site: http://{}/", args.addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server stopped")?;
    Ok(())
}
