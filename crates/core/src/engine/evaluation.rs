//! Engine evaluation scores

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A score reported by the engine, from the side to move's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum EvaluationScore {
    /// Centipawn score (100 = one pawn)
    #[serde(rename = "centipawn")]
    Centipawns(i32),
    /// Forced mate; the sign is the side favoured, the magnitude the distance
    #[serde(rename = "mate")]
    Mate(i32),
}

impl EvaluationScore {
    /// Builds a score from the `score <kind> <value>` pair of an info line
    pub fn from_uci(kind: &str, value: i32) -> Option<Self> {
        match kind {
            "cp" => Some(EvaluationScore::Centipawns(value)),
            "mate" => Some(EvaluationScore::Mate(value)),
            _ => None,
        }
    }

    /// The same evaluation seen from the other side of the board
    pub fn negate(self) -> Self {
        match self {
            EvaluationScore::Centipawns(cp) => EvaluationScore::Centipawns(-cp),
            EvaluationScore::Mate(moves) => EvaluationScore::Mate(-moves),
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            EvaluationScore::Centipawns(v) | EvaluationScore::Mate(v) => *v,
        }
    }

    /// Sign class of the value: zero, positive or negative
    pub fn sign_class(&self) -> Ordering {
        self.value().cmp(&0)
    }
}

impl fmt::Display for EvaluationScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationScore::Centipawns(cp) => {
                let score = *cp as f32 / 100.0;
                if *cp >= 0 {
                    write!(f, "+{:.2}", score)
                } else {
                    write!(f, "{:.2}", score)
                }
            }
            EvaluationScore::Mate(moves) => write!(f, "#{}", moves),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uci() {
        assert_eq!(EvaluationScore::from_uci("cp", -42), Some(EvaluationScore::Centipawns(-42)));
        assert_eq!(EvaluationScore::from_uci("mate", 3), Some(EvaluationScore::Mate(3)));
        assert_eq!(EvaluationScore::from_uci("wdl", 3), None);
    }

    #[test]
    fn test_negate() {
        assert_eq!(EvaluationScore::Centipawns(35).negate(), EvaluationScore::Centipawns(-35));
        assert_eq!(EvaluationScore::Mate(-2).negate(), EvaluationScore::Mate(2));
        assert_eq!(EvaluationScore::Mate(0).negate(), EvaluationScore::Mate(0));
    }

    #[test]
    fn test_display() {
        assert_eq!(EvaluationScore::Centipawns(35).to_string(), "+0.35");
        assert_eq!(EvaluationScore::Centipawns(-120).to_string(), "-1.20");
        assert_eq!(EvaluationScore::Mate(3).to_string(), "#3");
        assert_eq!(EvaluationScore::Mate(-1).to_string(), "#-1");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&EvaluationScore::Centipawns(35)).unwrap();
        assert_eq!(json, r#"{"kind":"centipawn","value":35}"#);

        let back: EvaluationScore = serde_json::from_str(r#"{"kind":"mate","value":-2}"#).unwrap();
        assert_eq!(back, EvaluationScore::Mate(-2));
    }
}
