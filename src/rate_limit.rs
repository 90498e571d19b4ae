/// Rate Limiting System
use crate::{
    auth::extract_bearer_token,
    config::RateLimitConfig,
    context::AppContext,
    error::{SonoraError, SonoraResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    anonymous: Arc<DirectLimiter>,
}

fn quota(rps: u32) -> Quota {
    let rate = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    // Allow a burst of one second's worth of requests
    Quota::per_second(rate).allow_burst(rate)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(quota(config.authenticated_rps))),
            anonymous: Arc::new(GovernorLimiter::direct(quota(config.anonymous_rps))),
        }
    }

    /// Check rate limit for a request carrying credentials
    pub fn check_authenticated(&self) -> SonoraResult<()> {
        Self::check(self.enabled, &self.authenticated)
    }

    /// Check rate limit for an anonymous request
    pub fn check_anonymous(&self) -> SonoraResult<()> {
        Self::check(self.enabled, &self.anonymous)
    }

    fn check(enabled: bool, limiter: &DirectLimiter) -> SonoraResult<()> {
        if !enabled {
            return Ok(());
        }

        limiter.check().map_err(|_| SonoraError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, SonoraError> {
    let result = if extract_bearer_token(request.headers()).is_some() {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_anonymous()
    };

    if let Err(e) = result {
        tracing::warn!("Rate limit hit on {}", request.uri().path());
        return Err(e);
    }

    Ok(next.run(request).await)
}
