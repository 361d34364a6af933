//! Verification orchestrator.
//!
//! Walks the declared resources in a fixed order, one phase per check, and
//! collects a `VerificationReport`. A failing phase is recorded and the run
//! moves on; only phases that need a previous phase's output are skipped.

pub mod check;
pub mod phase;

pub use check::{run_check, Verifier};
pub use phase::{Phase, PhaseOutcome, PhaseReport, VerificationReport};
