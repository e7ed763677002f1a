//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Default cap on relayed frames per connection. A 60 Hz client sending
/// inputs plus occasional action messages stays well under it.
pub const RELAY_RATE_LIMIT: u32 = 90;

/// Per-connection rate limiter state
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    frame_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new(frames_per_second: u32) -> Self {
        Self {
            frame_limiter: create_limiter(frames_per_second),
        }
    }

    /// Check if an inbound frame is allowed (returns true if allowed)
    pub fn check_frame(&self) -> bool {
        self.frame_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new(RELAY_RATE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_rejected() {
        let limiter = ConnectionRateLimiter::new(3);
        let allowed = (0..10).filter(|_| limiter.check_frame()).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn zero_quota_falls_back_to_one() {
        let limiter = ConnectionRateLimiter::new(0);
        assert!(limiter.check_frame());
        assert!(!limiter.check_frame());
    }
}
