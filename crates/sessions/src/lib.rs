//! Per-user provider sessions.
//!
//! The [`SessionManager`] is the only way to mutate session state. It owns
//! the registry (user id → state + provider handle) and the QR staging
//! store, applies lifecycle transitions atomically per user, and releases
//! provider handles whenever an entry leaves the registry. The [`Sweeper`]
//! evicts sessions the provider no longer reports as healthy.

pub mod challenge;
pub mod error;
pub mod manager;
mod registry;
pub mod state;
pub mod sweep;

pub use {
    challenge::ChallengeStatus,
    error::SessionError,
    manager::{Connection, SessionManager, SessionSummary, StopOutcome, Transition},
    state::{LifecycleEvent, SessionState},
    sweep::{SweepReport, Sweeper},
};
