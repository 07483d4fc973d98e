//! HTTP layer of the pipeline.
//!
//! # Data Flow
//! ```text
//! RequestOptions (request.rs)
//!     → headers.rs (X-Request-ID, X-CSRF-Token)
//!     → transport.rs (reqwest + cookie jar, under the timeout guard)
//!     → RawResponse (request.rs)
//!     → response.rs (envelope unwrapping → payload or ApiError)
//! ```

pub mod error;
pub mod headers;
pub mod request;
pub mod response;
pub mod transport;

pub use error::{codes, ApiError, ClientError, ClientResult};
pub use headers::{new_request_id, HeaderComposer, X_REQUEST_ID};
pub use request::{RawResponse, RequestOptions};
pub use response::{normalize, ErrorEnvelope, SuccessEnvelope};
pub use transport::Transport;
