use conduit_core::RequestId;
use thiserror::Error;

use crate::types::RateCategory;

/// Rate governor errors
///
/// A denied admission is not an error; see [`RateLimitCheck`](crate::RateLimitCheck).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateGovernorError {
    #[error("Reservation for {category} would be {requested} of limit {limit} (max 50%)")]
    ReservationExceeded {
        category: RateCategory,
        requested: u32,
        limit: u32,
    },

    #[error("Unknown queued request: {0}")]
    UnknownRequest(RequestId),
}

pub type Result<T> = std::result::Result<T, RateGovernorError>;
