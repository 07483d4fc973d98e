//! Session refresh subsystem.
//!
//! # Data Flow
//! ```text
//! 401 on a non-auth path
//!     → coordinator.rs (breaker check, enqueue, single-flight refresh)
//!     → refresher.rs (the one refresh_session() call)
//!     → coordinator.rs (replay queued calls, or settle them with their 401)
//! ```

pub mod coordinator;
pub mod refresher;

pub use coordinator::{RefreshCoordinator, ReplayFn};
pub use refresher::{HttpSessionRefresher, SessionRefresher};
