use axum::{
    routing::{get, post},
    Router,
};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use position_trainer_core::parser::load_database_file;
use position_trainer_core::{CandidateLine, GameRecord, Trainer, TrainerConfig};

mod routes;

use routes::exercise::ActiveExercise;

pub struct AppState {
    pub trainer: Trainer,
    pub games: RwLock<Vec<GameRecord>>,
    pub exercise: tokio::sync::Mutex<Option<ActiveExercise>>,
    /// Latest candidate lines of whichever analysis ran last
    pub latest: Mutex<Vec<CandidateLine>>,
    pub exercise_ids: AtomicU64,
}

impl AppState {
    pub fn new(trainer: Trainer, games: Vec<GameRecord>) -> Self {
        Self {
            trainer,
            games: RwLock::new(games),
            exercise: tokio::sync::Mutex::new(None),
            latest: Mutex::new(Vec::new()),
            exercise_ids: AtomicU64::new(0),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/health", get(routes::health))
        .route("/score", get(routes::score))
        .route("/database", post(routes::load_database))
        .route("/exercise", post(routes::exercise::new_exercise))
        .route("/exercise/move", post(routes::exercise::submit_move))
        .route(
            "/analysis",
            get(routes::analysis::latest_lines).post(routes::analysis::free_analysis),
        )
        .route("/analysis/stop", post(routes::analysis::stop_analysis));

    let router = match std::env::var("STATIC_DIR") {
        Ok(dir) => router.nest_service("/static", ServeDir::new(dir)),
        Err(_) => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = TrainerConfig::from_env().expect("Invalid trainer configuration");

    let games = match std::env::var("PGN_PATH") {
        Ok(path) => match load_database_file(&path) {
            Ok(games) => {
                info!(path = path.as_str(), games = games.len(), "loaded game database");
                games
            }
            Err(e) => {
                warn!(path = path.as_str(), "failed to load game database: {}", e);
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    };

    let state = Arc::new(AppState::new(Trainer::new(config), games));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    info!("Server running at http://{}", addr);

    axum::serve(listener, app(state)).await.expect("Server error");
}
