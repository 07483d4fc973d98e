//! Session state shared across calls.
//!
//! # Data Flow
//! ```text
//! store.rs   scoped JSON storage (breaker record, grace marker)
//! tokens.rs  CSRF cookie reads/writes, grace marker
//! signal.rs  session-expired broadcast
//! clock.rs   injectable wall clock for persisted deadlines
//! ```

pub mod clock;
pub mod signal;
pub mod store;
pub mod tokens;

pub use clock::{deadline_after, Clock, ManualClock, SystemClock};
pub use signal::{ExpiryReason, SessionExpired, SessionSignal};
pub use store::SessionStore;
pub use tokens::TokenStore;
