//! Speech dispatch engine.
//!
//! This module owns everything with state: the per-call
//! [`PlaybackSession`], its [`CancelToken`], the mutable [`EngineConfig`],
//! the [`EngineAvailability`] flags, and the [`SpeechEngine`] orchestrator
//! that ties the offline and online adapters together through the
//! [`SpeechBackend`] trait.
//!
//! # Architecture
//!
//! ```text
//! caller (CLI / UI thread)
//!        │ speak()                       │ stop()
//!        ▼                               ▼
//! SpeechEngine ──admit──▶ PlaybackSession ◀── cancel flag + halt
//!        │ spawn_blocking
//!        ▼
//!   OfflineBackend ──fail──▶ OnlineBackend
//! ```

pub mod backend;
pub mod orchestrator;
pub mod session;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use backend::SpeechBackend;
pub use orchestrator::SpeechEngine;
pub use session::{CancelToken, PlaybackSession};
pub use state::{EngineAvailability, EngineConfig, SessionState, SpeakOutcome, SpeechRequest};
