//! Practice lifecycle: the transition table and the machine that enforces it.

pub mod machine;
pub mod table;

pub use machine::{EvaluationOutcome, NewPractice, PracticeStateMachine, TransitionOutcome};
pub use table::{allowed_targets, is_allowed, milestone};
