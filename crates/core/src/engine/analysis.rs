//! Streaming multi-line analysis
//!
//! A session walks the engine through a fixed command sequence, then
//! collects `info` records by MultiPV rank until the engine reports its
//! best move, the session is stopped, or the guard timer runs out.
//! Partial results are handed to a callback shortly after the search
//! starts and then at a fixed cadence.

use serde::Serialize;
use shakmaty::Chess;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, trace, warn};

use super::evaluation::EvaluationScore;
use super::info::InfoRecord;
use super::link::EngineLink;
use super::session::EngineConnection;
use crate::board;
use crate::error::{Error, Result};

/// One candidate move from a MultiPV search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateLine {
    /// 1 = best
    pub rank: u32,
    /// First move of the variation in standard notation, or raw UCI if it
    /// could not be converted
    pub notation: String,
    pub score: EvaluationScore,
    pub depth: Option<u32>,
    /// Principal variation in UCI notation
    pub pv: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub position: Chess,
    /// Number of candidate lines (MultiPV)
    pub lines: usize,
    /// Search time handed to `go movetime`
    pub budget: Duration,
}

impl AnalysisRequest {
    pub fn new(position: Chess, lines: usize, budget: Duration) -> Self {
        Self {
            position,
            lines: lines.max(1),
            budget,
        }
    }
}

/// Timers that drive a session
#[derive(Debug, Clone, Copy)]
pub struct AnalysisTiming {
    /// Delay before the first partial result
    pub first_snapshot: Duration,
    /// Cadence of partial results after the first
    pub snapshot_every: Duration,
    /// Extra time past the budget before giving up on `bestmove`
    pub grace: Duration,
    /// Limit for each acknowledgement during session setup
    pub step_timeout: Duration,
}

impl Default for AnalysisTiming {
    fn default() -> Self {
        Self {
            first_snapshot: Duration::from_millis(500),
            snapshot_every: Duration::from_secs(5),
            grace: Duration::from_millis(2500),
            step_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingLine {
    score: EvaluationScore,
    depth: Option<u32>,
    pv: Vec<String>,
}

/// Latest record per rank for one session
struct RankTable<'a> {
    base: &'a Chess,
    slots: Vec<Option<PendingLine>>,
}

impl<'a> RankTable<'a> {
    fn new(base: &'a Chess, lines: usize) -> Self {
        Self {
            base,
            slots: vec![None; lines],
        }
    }

    /// Replaces the line stored at the record's rank. Ranks outside
    /// `1..=lines` are ignored.
    fn record(&mut self, info: InfoRecord) -> bool {
        let index = match (info.rank as usize).checked_sub(1) {
            Some(index) if index < self.slots.len() => index,
            _ => {
                trace!(rank = info.rank, "ignoring out of range multipv rank");
                return false;
            }
        };
        self.slots[index] = Some(PendingLine {
            score: info.score,
            depth: info.depth,
            pv: info.pv,
        });
        true
    }

    fn snapshot(&self) -> Vec<CandidateLine> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let line = slot.as_ref()?;
                let first = line.pv.first()?;
                let notation =
                    board::uci_to_san(self.base, first).unwrap_or_else(|| first.clone());
                Some(CandidateLine {
                    rank: index as u32 + 1,
                    notation,
                    score: line.score,
                    depth: line.depth,
                    pv: line.pv.clone(),
                })
            })
            .collect()
    }
}

/// Runs one analysis session on `connection`.
///
/// Fails with `EngineBusy` without touching the engine if another session
/// is in flight. `on_snapshot` receives partial results while the search
/// runs, and the final lines once more before they are returned.
pub async fn analyse<F>(
    connection: &EngineConnection,
    request: &AnalysisRequest,
    timing: &AnalysisTiming,
    mut on_snapshot: F,
) -> Result<Vec<CandidateLine>>
where
    F: FnMut(&[CandidateLine]) + Send,
{
    let session = connection.begin_session()?;
    let mut link = connection.link().await;

    if connection.search_pending() {
        if let Err(e) = finish_previous_search(&mut link, timing.step_timeout).await {
            warn!("previous search did not finish: {}", e);
            connection.mark_closed();
            return Err(e);
        }
        connection.set_search_pending(false);
    }

    if !link.drain() {
        connection.mark_closed();
        return Err(Error::Disconnected);
    }

    let result = run_session(
        connection,
        &mut link,
        request,
        timing,
        &session.stop,
        &mut on_snapshot,
    )
    .await;
    if matches!(result, Err(Error::Disconnected)) {
        connection.mark_closed();
    }
    result
}

async fn run_session<F>(
    connection: &EngineConnection,
    link: &mut EngineLink,
    request: &AnalysisRequest,
    timing: &AnalysisTiming,
    stop: &tokio::sync::Notify,
    on_snapshot: &mut F,
) -> Result<Vec<CandidateLine>>
where
    F: FnMut(&[CandidateLine]) + Send,
{
    let fen = board::serialize(&request.position);

    link.send("uci")?;
    expect(link, "uciok", "uciok", timing.step_timeout).await?;
    link.send(&format!("setoption name MultiPV value {}", request.lines))?;
    link.send("ucinewgame")?;
    link.send("isready")?;
    expect(link, "readyok", "readyok after ucinewgame", timing.step_timeout).await?;
    link.send(&format!("position fen {}", fen))?;
    link.send("isready")?;
    expect(link, "readyok", "readyok after position", timing.step_timeout).await?;
    connection.set_search_pending(true);
    link.send(&format!("go movetime {}", request.budget.as_millis()))?;
    debug!(fen = fen.as_str(), lines = request.lines, budget_ms = request.budget.as_millis() as u64, "analysis started");

    let started = Instant::now();
    let guard_deadline = started + request.budget + timing.grace;
    let mut next_snapshot = started + timing.first_snapshot;
    let mut stop_sent = false;
    let mut table = RankTable::new(&request.position, request.lines);

    loop {
        tokio::select! {
            line = link.next_line() => {
                let Some(line) = line else {
                    warn!("engine closed during analysis");
                    return Err(Error::Disconnected);
                };
                if line.starts_with("bestmove") {
                    debug!(line = line.as_str(), "analysis finished");
                    connection.set_search_pending(false);
                    break;
                }
                if line.starts_with("info") {
                    match InfoRecord::parse(&line) {
                        Ok(info) => {
                            table.record(info);
                        }
                        Err(e) => debug!("{}", e),
                    }
                }
            }
            _ = stop.notified(), if !stop_sent => {
                debug!("stopping analysis");
                link.send("stop")?;
                stop_sent = true;
            }
            _ = sleep_until(next_snapshot) => {
                on_snapshot(&table.snapshot());
                let cadence_start = started + timing.snapshot_every;
                next_snapshot = if next_snapshot < cadence_start {
                    cadence_start
                } else {
                    next_snapshot + timing.snapshot_every
                };
            }
            _ = sleep_until(guard_deadline) => {
                warn!("no bestmove before the guard timer, returning current lines");
                if !stop_sent {
                    link.send("stop")?;
                }
                break;
            }
        }
    }

    let lines = table.snapshot();
    on_snapshot(&lines);
    Ok(lines)
}

/// Stops a search an earlier session left running and consumes its
/// `bestmove`, so it cannot end the next search early
async fn finish_previous_search(link: &mut EngineLink, limit: Duration) -> Result<()> {
    debug!("waiting for the previous search to finish");
    link.send("stop")?;

    let wait = async {
        while let Some(line) = link.next_line().await {
            if line.starts_with("bestmove") {
                return Ok(());
            }
        }
        Err(Error::Disconnected)
    };
    timeout(limit, wait)
        .await
        .unwrap_or(Err(Error::StepTimeout("bestmove of previous search")))
}

/// Reads lines until `token` arrives or `limit` passes
async fn expect(
    link: &mut EngineLink,
    token: &str,
    step: &'static str,
    limit: Duration,
) -> Result<()> {
    let wait = async {
        while let Some(line) = link.next_line().await {
            if line == token {
                return Ok(());
            }
            trace!(line = line.as_str(), step, "ignored while waiting");
        }
        Err(Error::Disconnected)
    };
    timeout(limit, wait).await.unwrap_or(Err(Error::StepTimeout(step)))
}
