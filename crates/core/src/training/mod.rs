//! Exercise selection and grading

pub mod exercise;
pub mod grading;

pub use exercise::{pick_exercise, target_ply, Exercise, MoveInterval};
pub use grading::{is_correct, Analyse, GradeOutcome, Grader, GradingPolicy, Scoreboard};
