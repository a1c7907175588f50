use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use serde_json::json;

use crate::db::now_ms;
use crate::state::AppState;

/// Paths that must stay reachable regardless of client behavior.
const ALLOW_LIST: &[&str] = &["/health"];

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the oldest counted hit falls out of the window.
    pub reset_secs: u64,
    pub retry_after_secs: u64,
}

/// Per-IP sliding window: each hit is a timestamp, pruned as it ages out.
pub struct RateLimiter {
    max: u32,
    window_ms: u64,
    hits: DashMap<IpAddr, VecDeque<u64>>,
}

impl RateLimiter {
    pub fn new(max: u32, window_ms: u64) -> RateLimiter {
        RateLimiter {
            max,
            window_ms,
            hits: DashMap::new(),
        }
    }

    pub fn check(&self, ip: IpAddr, now_ms: u64) -> RateDecision {
        let mut window = self.hits.entry(ip).or_default();
        let cutoff = now_ms.saturating_sub(self.window_ms);
        while window.front().is_some_and(|&t| t <= cutoff) {
            window.pop_front();
        }

        let reset_at = window
            .front()
            .map(|&t| t + self.window_ms)
            .unwrap_or(now_ms + self.window_ms);
        let reset_secs = reset_at.saturating_sub(now_ms).div_ceil(1000);

        if (window.len() as u32) < self.max {
            window.push_back(now_ms);
            RateDecision {
                allowed: true,
                limit: self.max,
                remaining: self.max - window.len() as u32,
                reset_secs,
                retry_after_secs: 0,
            }
        } else {
            RateDecision {
                allowed: false,
                limit: self.max,
                remaining: 0,
                reset_secs,
                retry_after_secs: reset_secs.max(1),
            }
        }
    }
}

fn apply_headers(resp: &mut Response, d: &RateDecision) {
    let headers = resp.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(d.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(d.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(d.reset_secs));
}

pub async fn rate_limit_mw(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if ALLOW_LIST.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let decision = state.rate.check(addr.ip(), now_ms() as u64);
    if !decision.allowed {
        let body = axum::Json(json!({
            "error": "RATE_LIMITED",
            "retryAfter": decision.retry_after_secs,
        }));
        let mut resp = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        apply_headers(&mut resp, &decision);
        resp.headers_mut().insert(
            "retry-after",
            HeaderValue::from(decision.retry_after_secs),
        );
        return resp;
    }

    let mut resp = next.run(req).await;
    apply_headers(&mut resp, &decision);
    resp
}
