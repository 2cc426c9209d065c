//! Conduit Ports
//!
//! Port definitions (traits) for the exchange connectivity core.
//! These define the boundaries between connectivity logic and the runtime:
//! the time source and the byte-stream primitive used by FIX sessions.

mod clock;
mod error;
mod stream;

pub use clock::Clock;
pub use error::{StreamError, StreamResult};
pub use stream::{ByteSink, StreamConnector, StreamEvent, StreamHandle};
