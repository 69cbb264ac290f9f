//! Rate limiting for the room lifecycle endpoints.
//!
//! A keyed GCRA limiter (one cell per source address) bounds the `/rooms`
//! prefix to a fixed budget per minute. The tower layer emits the usual
//! `X-RateLimit-*` headers on every limited route and answers `429` with a
//! `Retry-After` hint once the budget is spent.

use axum::body::Body;
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use hyper::Request;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};

use crate::prelude::*;

/// Request budget for the `/rooms` prefix, per source IP.
pub const ROOMS_PER_MINUTE: u32 = 30;

type KeyedLimiter =
	RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, StateInformationMiddleware>;

pub struct RateLimitManager {
	limiter: KeyedLimiter,
	limit: u32,
}

impl RateLimitManager {
	pub fn new(per_minute: u32) -> Self {
		let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
		Self {
			limiter: RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>(),
			limit: per_minute,
		}
	}

	pub fn limit(&self) -> u32 {
		self.limit
	}

	/// Returns the remaining budget, or how long the caller has to wait.
	pub fn check(&self, addr: &IpAddr) -> Result<u32, Duration> {
		match self.limiter.check_key(addr) {
			Ok(snapshot) => Ok(snapshot.remaining_burst_capacity()),
			Err(not_until) => Err(not_until.wait_time_from(DefaultClock::default().now())),
		}
	}
}

impl std::fmt::Debug for RateLimitManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RateLimitManager").field("limit", &self.limit).finish()
	}
}

/// Best source address available: proxy header first, then socket peer.
fn extract_client_ip(req: &Request<Body>) -> Option<IpAddr> {
	if let Some(forwarded) = req.headers().get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
		if let Some(first) = forwarded.split(',').next() {
			if let Ok(ip) = first.trim().parse() {
				return Some(ip);
			}
		}
	}
	req.extensions()
		.get::<axum::extract::ConnectInfo<SocketAddr>>()
		.map(|info| info.0.ip())
}

fn limited_response(limit: u32, retry_after: Duration) -> axum::response::Response {
	let mut res = Error::RateLimited.into_response();
	let headers = res.headers_mut();
	headers.insert("x-ratelimit-limit", limit.into());
	headers.insert("x-ratelimit-remaining", 0u32.into());
	headers.insert("retry-after", (retry_after.as_secs().max(1) as u32).into());
	res
}

/// Rate limit middleware layer
#[derive(Clone)]
pub struct RateLimitLayer {
	manager: Arc<RateLimitManager>,
}

impl RateLimitLayer {
	pub fn new(manager: Arc<RateLimitManager>) -> Self {
		Self { manager }
	}
}

impl<S> Layer<S> for RateLimitLayer {
	type Service = RateLimitService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		RateLimitService { inner, manager: self.manager.clone() }
	}
}

/// Rate limit middleware service
#[derive(Clone)]
pub struct RateLimitService<S> {
	inner: S,
	manager: Arc<RateLimitManager>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
	S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let manager = self.manager.clone();
		let mut inner = self.inner.clone();

		Box::pin(async move {
			let mut remaining = None;
			if let Some(ip) = extract_client_ip(&req) {
				match manager.check(&ip) {
					Ok(budget) => remaining = Some(budget),
					Err(retry_after) => {
						debug!("Rate limited {} for {:?}", ip, retry_after);
						return Ok(limited_response(manager.limit(), retry_after));
					}
				}
			}

			let mut res = inner.call(req).await?;
			if let Some(budget) = remaining {
				let headers = res.headers_mut();
				headers.insert("x-ratelimit-limit", manager.limit().into());
				headers.insert("x-ratelimit-remaining", budget.into());
			}
			Ok(res)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::Ipv4Addr;

	#[test]
	fn test_budget_exhaustion() {
		let manager = RateLimitManager::new(5);
		let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

		for _ in 0..5 {
			assert!(manager.check(&ip).is_ok());
		}
		let wait = manager.check(&ip);
		assert!(wait.is_err());
		assert!(wait.unwrap_err() > Duration::ZERO);
	}

	#[test]
	fn test_addresses_are_independent() {
		let manager = RateLimitManager::new(1);
		let a = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1));
		let b = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 2));

		assert!(manager.check(&a).is_ok());
		assert!(manager.check(&a).is_err());
		assert!(manager.check(&b).is_ok());
	}

	#[test]
	fn test_remaining_counts_down() {
		let manager = RateLimitManager::new(10);
		let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 3));

		let first = manager.check(&ip).unwrap();
		let second = manager.check(&ip).unwrap();
		assert!(second < first);
	}
}

// vim: ts=4
