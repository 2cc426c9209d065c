//! Conduit Clock Infrastructure
//!
//! Provides time sources for production and tests:
//!
//! - [`SystemClock`]: wall-clock UTC time
//! - [`ManualClock`]: frozen time that only moves when told to, for
//!   deterministic rate-window and health-metric tests
//!
//! ## Usage
//!
//! ```ignore
//! use conduit_clock::{ManualClock, SystemClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::starting_now();
//! clock.advance(Duration::seconds(61)); // roll a one-minute window
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use conduit_ports::Clock;
