//! Relay server for a real-time collaborative text editor.
//!
//! Clients sync document state over a binary Yjs WebSocket channel and
//! coordinate presence, file operations, and access control over a JSON
//! control channel, scoped by token-authenticated rooms. The server never
//! interprets document content; it routes, fans out, and persists.

pub mod auth;
pub mod control;
pub mod core;
pub mod crdt;
pub mod error;
pub mod gateway;
pub mod prelude;
pub mod room;
pub mod routes;
pub mod store_adapter;
pub mod types;
pub mod webserver;

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::github::GithubOauth;
use crate::auth::identity::IdentityVerifier;
use crate::core::app::{AppOpts, AppState};
use crate::prelude::*;
use crate::store_adapter::DocStore;

pub struct Builder {
	listen: Box<str>,
	tls: Option<(PathBuf, PathBuf)>,
	require_identity: bool,
	jwt_secret: Option<Box<str>>,
	github_client: Option<(Box<str>, Box<str>)>,
	cors_origin: Box<str>,
	store: Option<Arc<dyn DocStore>>,
}

impl Builder {
	pub fn new() -> Self {
		Builder {
			listen: "0.0.0.0:4321".into(),
			tls: None,
			require_identity: false,
			jwt_secret: None,
			github_client: None,
			cors_origin: "*".into(),
			store: None,
		}
	}

	// Opts
	pub fn listen(&mut self, listen: impl Into<Box<str>>) -> &mut Self { self.listen = listen.into(); self }
	pub fn tls(&mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> &mut Self { self.tls = Some((cert.into(), key.into())); self }
	pub fn require_identity(&mut self, require: bool) -> &mut Self { self.require_identity = require; self }
	pub fn jwt_secret(&mut self, secret: impl Into<Box<str>>) -> &mut Self { self.jwt_secret = Some(secret.into()); self }
	pub fn github_client(&mut self, id: impl Into<Box<str>>, secret: impl Into<Box<str>>) -> &mut Self {
		self.github_client = Some((id.into(), secret.into()));
		self
	}
	pub fn cors_origin(&mut self, origin: impl Into<Box<str>>) -> &mut Self { self.cors_origin = origin.into(); self }

	// Adapters
	pub fn store(&mut self, store: Arc<dyn DocStore>) -> &mut Self { self.store = Some(store); self }

	/// Assemble the application state without serving. Used by tests and by
	/// `run`. Fails fast on inconsistent configuration; in particular,
	/// requiring identity auth without a secret refuses to start.
	pub fn build(&self) -> SrvResult<App> {
		let store = self
			.store
			.clone()
			.ok_or_else(|| Error::ConfigError("no document store configured".into()))?;
		let identity = self.jwt_secret.as_deref().map(IdentityVerifier::new);
		let github = match &self.github_client {
			Some((id, secret)) => Some(GithubOauth::new(id.clone(), secret.clone())?),
			None => None,
		};

		AppState::new(
			store,
			identity,
			github,
			AppOpts {
				require_identity: self.require_identity,
				cors_origin: self.cors_origin.clone(),
				tls: self.tls.is_some(),
			},
		)
	}

	pub async fn run(self) -> SrvResult<()> {
		tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.init();

		let app = self.build()?;
		app.registry.hydrate().await?;

		let router = routes::init(app.clone());
		info!("liveshare relay v{} starting", core::app::VERSION);
		webserver::serve(&self.listen, self.tls.clone(), router).await?;

		// Listener drained; flush documents and close the store exactly once.
		info!("Shutting down: persisting open documents");
		app.crdt.shutdown().await;
		app.store.close().await?;
		info!("Shutdown complete");
		Ok(())
	}
}

impl Default for Builder {
	fn default() -> Self { Self::new() }
}

// vim: ts=4
