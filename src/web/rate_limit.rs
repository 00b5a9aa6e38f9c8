use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{StatusCode, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, SocketAddr},
};

/// How often do we allow the same ip in the time frame
const IP_LIMIT: usize = 100;
const IP_WINDOW: Duration = Duration::seconds(10 * 60); // 10 minutes

/// How often do we allow login attempts against the same username
const USERNAME_LIMIT: usize = 10;
const USERNAME_WINDOW: Duration = Duration::seconds(10 * 60); // 10 minutes

const MAX_IDLE: Duration = Duration::seconds(24 * 3600); // remove after 24h idle
const PRUNE_INTERVAL: Duration = Duration::seconds(10 * 60); // check every 10 minutes

#[derive(Debug)]
struct SlidingWindow {
    hits: VecDeque<DateTime<Utc>>,
    window: Duration,
    limit: usize,
    last_seen: DateTime<Utc>,
}

impl SlidingWindow {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            hits: VecDeque::with_capacity(limit),
            window,
            limit,
            last_seen: Utc::now(),
        }
    }

    fn allow(&mut self, now: DateTime<Utc>) -> bool {
        // Remove expired hits
        while let Some(&ts) = self.hits.front() {
            if now - ts > self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        self.last_seen = now;

        if self.hits.len() < self.limit {
            self.hits.push_back(now);
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    by_ip: HashMap<String, SlidingWindow>,
    by_username: HashMap<String, SlidingWindow>,
    last_prune: DateTime<Utc>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            by_ip: HashMap::new(),
            by_username: HashMap::new(),
            last_prune: Utc::now(),
        }
    }

    /// Check if the request is allowed
    /// There is always an IP; a username is only passed for credential
    /// endpoints - everything that's set has to be allowed
    pub fn check(&mut self, ip: &str, username: Option<&str>) -> bool {
        let now = Utc::now();
        self.prune_if_needed(now);

        let ip_ok = self
            .by_ip
            .entry(ip.to_string())
            .or_insert_with(|| SlidingWindow::new(IP_LIMIT, IP_WINDOW))
            .allow(now);

        let username_ok = if let Some(username) = username {
            self.by_username
                .entry(username.to_string())
                .or_insert_with(|| SlidingWindow::new(USERNAME_LIMIT, USERNAME_WINDOW))
                .allow(now)
        } else {
            true // no username provided -> skip check
        };

        ip_ok && username_ok
    }

    /// Every PRUNE_INTERVAL, remove outdated entries
    fn prune_if_needed(&mut self, now: DateTime<Utc>) {
        if now - self.last_prune < PRUNE_INTERVAL {
            return;
        }

        self.last_prune = now;

        // only keep recent entries
        self.by_ip.retain(|_, win| now - win.last_seen <= MAX_IDLE);
        self.by_username
            .retain(|_, win| now - win.last_seen <= MAX_IDLE);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RealIp(pub IpAddr);

impl<S> FromRequestParts<S> for RealIp
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Behind a proxy or load balancer the client address is the first
        // X-Forwarded-For entry
        if let Some(forwarded) = parts.headers.get("x-forwarded-for")
            && let Ok(s) = forwarded.to_str()
            && let Some(ip_str) = s.split(',').next()
            && let Ok(ip) = ip_str.trim().parse()
        {
            return Ok(RealIp(ip));
        }

        // Fallback to socket addr for local dev
        if let Some(addr) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(RealIp(addr.ip()));
        }

        Err((StatusCode::BAD_REQUEST, "No request IP"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_blocks_over_limit() {
        let mut win = SlidingWindow::new(3, Duration::seconds(60));
        let now = Utc::now();

        assert!(win.allow(now));
        assert!(win.allow(now));
        assert!(win.allow(now));
        assert!(!win.allow(now));
    }

    #[test]
    fn window_frees_up_after_expiry() {
        let mut win = SlidingWindow::new(1, Duration::seconds(60));
        let now = Utc::now();

        assert!(win.allow(now));
        assert!(!win.allow(now));
        assert!(win.allow(now + Duration::seconds(61)));
    }

    #[test]
    fn username_limit_is_independent_of_ip_limit() {
        let mut limiter = RateLimiter::new();

        for _ in 0..USERNAME_LIMIT {
            assert!(limiter.check("10.0.0.1", Some("a@b.com")));
        }
        // username exhausted, ip still fine
        assert!(!limiter.check("10.0.0.1", Some("a@b.com")));
        assert!(limiter.check("10.0.0.1", None));
    }
}
