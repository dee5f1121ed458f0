//! Movetext tokenizer
//!
//! Reduces PGN movetext to the bare sequence of moves. Comments, variations,
//! annotation glyphs, move numbers and result markers are removed, and any
//! token that does not look like a move is dropped.

use regex::Regex;
use std::sync::LazyLock;

/// Innermost variations are removed one layer per pass
const MAX_VARIATION_DEPTH: usize = 8;

const RESULT_MARKERS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}").unwrap());
static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m);.*$").unwrap());
static NAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\d+").unwrap());
static VARIATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^()]*\)").unwrap());
static MOVE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.(\.\.)?|\.\.\.").unwrap());

static CASTLING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(O-O(-O)?|0-0(-0)?)[+#]?[!?]*$").unwrap());
static SAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](=[QRBN])?[+#]?[!?]*$").unwrap()
});

/// Splits movetext into move tokens in ply order
pub fn tokenize_movetext(movetext: &str) -> Vec<String> {
    let text = COMMENT.replace_all(movetext, " ");
    let text = LINE_COMMENT.replace_all(&text, " ");
    let mut text = NAG.replace_all(&text, " ").into_owned();

    for _ in 0..MAX_VARIATION_DEPTH {
        let stripped = VARIATION.replace_all(&text, " ").into_owned();
        if stripped == text {
            break;
        }
        text = stripped;
    }

    let text = MOVE_NUMBER.replace_all(&text, " ");

    text.split_whitespace()
        .filter(|token| !RESULT_MARKERS.contains(token))
        .filter(|token| is_san_like(token))
        .map(String::from)
        .collect()
}

/// Returns true if the token has the shape of a move in standard notation
pub fn is_san_like(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    CASTLING.is_match(token) || SAN.is_match(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_movetext() {
        let tokens = tokenize_movetext("1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 1-0");
        assert_eq!(tokens, vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]);
    }

    #[test]
    fn test_strips_annotations() {
        let movetext = "1. e4 {best by test} e5 $1 2. Nf3 (2. f4 exf4 (2... d5 3. exd5 \
                        (3. Nc3 {deep} d4)) 3. Nf3) 2... Nc6 $14 3. Bb5 1/2-1/2";
        let tokens = tokenize_movetext(movetext);

        assert_eq!(tokens, vec!["e4", "e5", "Nf3", "Nc6", "Bb5"]);
        for token in &tokens {
            assert!(!token.contains('{') && !token.contains('}'));
            assert!(!token.contains('(') && !token.contains(')'));
            assert!(!token.contains('$'));
        }
    }

    #[test]
    fn test_drops_result_markers() {
        for result in ["1-0", "0-1", "1/2-1/2", "*"] {
            let tokens = tokenize_movetext(&format!("1. d4 d5 {}", result));
            assert_eq!(tokens, vec!["d4", "d5"]);
        }
    }

    #[test]
    fn test_black_move_numbers() {
        let tokens = tokenize_movetext("12... Qxd5 13.Rad1 ... Rfe8");
        assert_eq!(tokens, vec!["Qxd5", "Rad1", "Rfe8"]);
    }

    #[test]
    fn test_castling_and_promotion() {
        let tokens = tokenize_movetext("1. O-O o-o-o 2. 0-0 exd8=Q+ 3. Qh4# Nf3!?");
        assert_eq!(tokens, vec!["O-O", "o-o-o", "0-0", "exd8=Q+", "Qh4#", "Nf3!?"]);
    }

    #[test]
    fn test_drops_noise() {
        let tokens = tokenize_movetext("1. e4 ?? xyz e5 Z9 ; rest of line is a comment\n2. Nf3");
        assert_eq!(tokens, vec!["e4", "e5", "Nf3"]);
    }

    #[test]
    fn test_is_san_like() {
        assert!(is_san_like("e4"));
        assert!(is_san_like("Nbd7"));
        assert!(is_san_like("R1e2"));
        assert!(is_san_like("Qh4xe1"));
        assert!(is_san_like("exd6"));
        assert!(is_san_like("a8=N"));
        assert!(is_san_like("O-O-O+"));
        assert!(is_san_like("0-0"));
        assert!(!is_san_like(""));
        assert!(!is_san_like("1-0"));
        assert!(!is_san_like("e9"));
        assert!(!is_san_like("Pe4"));
        assert!(!is_san_like("{comment}"));
    }

    #[test]
    fn test_restartable() {
        let movetext = "1. e4 (1. d4) e5 {x} 2. Nf3 *";
        assert_eq!(tokenize_movetext(movetext), tokenize_movetext(movetext));
    }
}
