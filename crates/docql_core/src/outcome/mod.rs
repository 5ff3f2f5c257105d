//! Write results and the atomicity policy that shapes them.

pub mod atomicity;
pub mod write_outcome;

pub use atomicity::{Determinism, NonDeterministicWrite, analyze, classify_row};
pub use write_outcome::{OutcomeField, RowError, WriteKind, WriteOutcome};
