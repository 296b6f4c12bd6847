//! Per-factor debate
//!
//! ```text
//! PENDING → SUPPORTED → CRITIQUED ─┬─────────────────────────────┬→ RESOLVED
//!    │          │                  └→ REBUTTED → RECRITIQUED ────┘
//!    └──────────┴─ collaborator failure (synthetic REJECTED) ──────→ RESOLVED
//! ```
//!
//! A concession moves REBUTTED straight to RECRITIQUED without a second
//! critique. RESOLVED is absorbing.

pub mod record;
pub mod runner;
pub mod state;

pub use record::{DebateRecord, Resolution, SubClaim, SubClaimStatus};
pub use runner::FactorRunner;
pub use state::{FactorDebate, FactorPhase, PhaseTransition, TransitionError};
