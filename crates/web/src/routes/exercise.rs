use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use position_trainer_core::{CandidateLine, Exercise, GradeOutcome, MoveInterval};

use super::{ApiError, ApiResult};
use crate::AppState;

/// The exercise currently on the board
pub struct ActiveExercise {
    pub id: u64,
    pub exercise: Exercise,
    pub candidates: Vec<CandidateLine>,
    pub deadline: DateTime<Utc>,
}

#[derive(Deserialize, Default)]
pub struct ExerciseRequest {
    /// Full-move interval such as `"20-25"`
    pub interval: Option<String>,
}

#[derive(Serialize)]
pub struct ExerciseView {
    pub fen: String,
    pub full_move: Option<u32>,
    pub ply: Option<usize>,
    pub headers: BTreeMap<String, String>,
    /// Full text of the source game
    pub game: String,
    pub seconds: u64,
    pub deadline: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub san: String,
}

#[derive(Serialize)]
pub struct MoveView {
    pub expired: bool,
    #[serde(flatten)]
    pub outcome: GradeOutcome,
}

/// Picks a position, analyses it, and starts the exercise clock
pub async fn new_exercise(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExerciseRequest>,
) -> ApiResult<ExerciseView> {
    let interval = request.interval.as_deref().and_then(MoveInterval::parse);

    let (exercise, headers, game) = {
        let games = state.games.read().await;
        let exercise = state.trainer.pick_exercise(&games, interval)?;
        let record = &games[exercise.game_index];
        (exercise, record.headers.clone(), record.raw.clone())
    };

    // Any unanswered exercise is simply replaced
    state.exercise.lock().await.take();

    let snapshot_state = state.clone();
    let candidates = state
        .trainer
        .analyse_exercise(&exercise, move |lines| {
            if let Ok(mut latest) = snapshot_state.latest.lock() {
                *latest = lines.to_vec();
            }
        })
        .await?;

    let seconds = state.trainer.config().exercise_seconds;
    let deadline = Utc::now() + chrono::Duration::seconds(seconds as i64);
    let id = state.exercise_ids.fetch_add(1, Ordering::SeqCst) + 1;

    let view = ExerciseView {
        fen: exercise.fen.clone(),
        full_move: exercise.full_move,
        ply: exercise.target_ply,
        headers,
        game,
        seconds,
        deadline,
    };

    info!(id, fen = view.fen.as_str(), lines = candidates.len(), "exercise started");
    *state.exercise.lock().await = Some(ActiveExercise {
        id,
        exercise,
        candidates,
        deadline,
    });
    spawn_clock(state.clone(), id, seconds);

    Ok(Json(view))
}

/// Applies the timeout penalty if exercise `id` is still unanswered when
/// its clock runs out
fn spawn_clock(state: Arc<AppState>, id: u64, seconds: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(seconds)).await;

        let mut active = state.exercise.lock().await;
        if active.as_ref().is_some_and(|current| current.id == id) {
            active.take();
            let score = state.trainer.expire();
            warn!(id, score, "exercise clock ran out");
        }
    });
}

/// Grades the learner's move for the active exercise
pub async fn submit_move(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<MoveView> {
    let san = request.san.trim();
    if san.is_empty() {
        return Err(ApiError::BadRequest("missing move".to_string()));
    }

    let active = state
        .exercise
        .lock()
        .await
        .take()
        .ok_or(ApiError::NotFound("no active exercise"))?;

    if Utc::now() > active.deadline {
        let score = state.trainer.expire();
        let penalty = state.trainer.config().timeout_penalty;
        return Ok(Json(MoveView {
            expired: true,
            outcome: GradeOutcome {
                correct: false,
                score_delta: -penalty,
                score,
                submitted: san.to_string(),
                top: active.candidates.first().map(|line| line.score),
                evaluation: None,
                best_moves: active.candidates.iter().map(|line| line.notation.clone()).collect(),
            },
        }));
    }

    let outcome = state
        .trainer
        .grade(&active.exercise.position, &active.candidates, san)
        .await;

    Ok(Json(MoveView {
        expired: false,
        outcome,
    }))
}
