use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::{QuantaClock, QuantaInstant},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, time::Duration};

// Defaults for the consulate site.
const SITE_REQ_PER_SEC: NonZeroU32 = nonzero!(4u32);
const SITE_MIN_GAP: Duration = Duration::from_millis(200);

type DirectLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

/// Politeness towards one host: a cap on the average rate plus a minimum gap
/// between any two requests.
pub struct RateLimiter {
    average: DirectLimiter,
    gap: Option<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(req_per_sec: NonZeroU32, min_gap: Duration) -> Self {
        RateLimiter {
            average: GovernorRateLimiter::direct(Quota::per_second(req_per_sec)),
            // A zero gap has no quota, so only the average applies.
            gap: Quota::with_period(min_gap).map(GovernorRateLimiter::direct),
        }
    }

    pub async fn wait_until_ready(&self) {
        self.average.until_ready().await;
        if let Some(gap) = &self.gap {
            gap.until_ready().await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(SITE_REQ_PER_SEC, SITE_MIN_GAP)
    }
}
