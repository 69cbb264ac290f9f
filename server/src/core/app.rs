//! App state type

use std::sync::Arc;
use std::time::Instant;

use crate::auth::github::GithubOauth;
use crate::auth::identity::IdentityVerifier;
use crate::control::ControlEngine;
use crate::core::rate_limit::{RateLimitManager, ROOMS_PER_MINUTE};
use crate::crdt::CrdtEngine;
use crate::prelude::*;
use crate::room::Registry;
use crate::store_adapter::DocStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug)]
pub struct AppOpts {
	/// Every WebSocket upgrade must present a valid identity token.
	pub require_identity: bool,
	/// Allowed CORS origin; `*` means any.
	pub cors_origin: Box<str>,
	/// Serving over TLS (affects the OAuth redirect URI scheme).
	pub tls: bool,
}

pub struct AppState {
	pub registry: Registry,
	pub crdt: Arc<CrdtEngine>,
	pub control: Arc<ControlEngine>,
	pub store: Arc<dyn DocStore>,
	pub identity: Option<IdentityVerifier>,
	pub github: Option<GithubOauth>,
	pub rate_limiter: Arc<RateLimitManager>,
	pub opts: AppOpts,
	pub started_at: Instant,
}

pub type App = Arc<AppState>;

impl AppState {
	pub fn new(
		store: Arc<dyn DocStore>,
		identity: Option<IdentityVerifier>,
		github: Option<GithubOauth>,
		opts: AppOpts,
	) -> SrvResult<App> {
		if opts.require_identity && identity.is_none() {
			return Err(Error::ConfigError(
				"identity auth is required but no identity secret is configured".into(),
			));
		}

		Ok(Arc::new(AppState {
			registry: Registry::new(store.clone()),
			crdt: Arc::new(CrdtEngine::new(store.clone())),
			control: Arc::new(ControlEngine::new()),
			store,
			identity,
			github,
			rate_limiter: Arc::new(RateLimitManager::new(ROOMS_PER_MINUTE)),
			opts,
			started_at: Instant::now(),
		}))
	}
}

impl std::fmt::Debug for AppState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppState")
			.field("registry", &self.registry)
			.field("crdt", &self.crdt)
			.field("control", &self.control)
			.field("opts", &self.opts)
			.finish()
	}
}

// vim: ts=4
