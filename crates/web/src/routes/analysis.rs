use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use shakmaty::Chess;
use std::sync::Arc;
use std::time::Duration;

use position_trainer_core::{board, CandidateLine};

use super::ApiResult;
use crate::AppState;

#[derive(Deserialize, Default)]
pub struct AnalysisParams {
    /// Position to analyse; the active exercise (or the opening) if absent
    pub fen: Option<String>,
    pub lines: Option<usize>,
    pub millis: Option<u64>,
}

#[derive(Serialize)]
pub struct AnalysisView {
    pub fen: String,
    pub lines: Vec<CandidateLine>,
}

#[derive(Serialize)]
pub struct StopView {
    pub stopped: bool,
}

/// Runs a free analysis and returns the final candidate lines
pub async fn free_analysis(
    State(state): State<Arc<AppState>>,
    Json(params): Json<AnalysisParams>,
) -> ApiResult<AnalysisView> {
    let position = match params.fen.as_deref() {
        Some(fen) => board::parse_fen(fen)?,
        None => current_position(&state).await,
    };

    let config = state.trainer.config();
    let lines = params.lines.unwrap_or(config.exercise_lines).clamp(1, 10);
    let budget = params
        .millis
        .map(Duration::from_millis)
        .unwrap_or(config.free_budget);

    let snapshot_state = state.clone();
    let fen = board::serialize(&position);
    let lines = state
        .trainer
        .start_analysis(position, lines, budget, move |lines| {
            if let Ok(mut latest) = snapshot_state.latest.lock() {
                *latest = lines.to_vec();
            }
        })
        .await?;

    Ok(Json(AnalysisView { fen, lines }))
}

/// Most recent snapshot of the running (or last) analysis
pub async fn latest_lines(State(state): State<Arc<AppState>>) -> Json<Vec<CandidateLine>> {
    let latest = state
        .latest
        .lock()
        .map(|lines| lines.clone())
        .unwrap_or_default();
    Json(latest)
}

pub async fn stop_analysis(State(state): State<Arc<AppState>>) -> Json<StopView> {
    Json(StopView {
        stopped: state.trainer.stop_analysis().await,
    })
}

async fn current_position(state: &AppState) -> Chess {
    state
        .exercise
        .lock()
        .await
        .as_ref()
        .map(|active| active.exercise.position.clone())
        .unwrap_or_default()
}
