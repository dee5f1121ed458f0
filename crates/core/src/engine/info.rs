//! Parsing of UCI `info` records

use super::evaluation::EvaluationScore;
use crate::error::{Error, Result};

/// The parts of an `info` line that analysis cares about
#[derive(Debug, Clone, PartialEq)]
pub struct InfoRecord {
    /// MultiPV rank, 1 = best
    pub rank: u32,
    pub depth: Option<u32>,
    pub score: EvaluationScore,
    /// Principal variation in UCI notation
    pub pv: Vec<String>,
}

impl InfoRecord {
    /// Parses an `info` line.
    ///
    /// Format: `info depth 20 multipv 2 score cp 35 nodes 1000 pv e2e4 e7e5 ...`
    ///
    /// Lines without a score or without a principal variation are
    /// rejected as `MalformedRecord`.
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.first() != Some(&"info") {
            return Err(Error::MalformedRecord(line.to_string()));
        }

        let mut rank: u32 = 1;
        let mut depth = None;
        let mut score = None;
        let mut pv = Vec::new();

        let mut i = 1;
        while i < parts.len() {
            match parts[i] {
                "depth" => {
                    i += 1;
                    if i < parts.len() {
                        depth = parts[i].parse().ok();
                    }
                }
                "multipv" => {
                    i += 1;
                    if i < parts.len() {
                        rank = parts[i].parse().unwrap_or(1);
                    }
                }
                "score" => {
                    if i + 2 < parts.len() {
                        if let Ok(value) = parts[i + 2].parse() {
                            score = EvaluationScore::from_uci(parts[i + 1], value);
                        }
                    }
                    i += 2;
                }
                "pv" => {
                    i += 1;
                    while i < parts.len() && !is_info_keyword(parts[i]) {
                        pv.push(parts[i].to_string());
                        i += 1;
                    }
                    continue;
                }
                "string" => break,
                _ => {}
            }
            i += 1;
        }

        match score {
            Some(score) if !pv.is_empty() => Ok(InfoRecord {
                rank,
                depth,
                score,
                pv,
            }),
            _ => Err(Error::MalformedRecord(line.to_string())),
        }
    }
}

fn is_info_keyword(s: &str) -> bool {
    matches!(
        s,
        "depth"
            | "seldepth"
            | "multipv"
            | "score"
            | "nodes"
            | "nps"
            | "time"
            | "pv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "tbhits"
            | "wdl"
            | "bmc"
            | "string"
    )
}
