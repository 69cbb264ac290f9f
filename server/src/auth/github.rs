//! GitHub OAuth dance.
//!
//! `GET /auth/github` redirects the browser to GitHub's authorize page;
//! the callback exchanges the code for an access token, fetches the user
//! profile, and hands a signed identity token back to the opener window.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{Html, Redirect};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;

use crate::auth::identity::IdentityClaims;
use crate::prelude::*;

/// Outbound HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Issued identity tokens live for a day; clients re-authenticate after.
const TOKEN_TTL_SECS: i64 = 24 * 3600;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";

#[derive(Debug, Deserialize)]
pub struct GithubUser {
	pub id: u64,
	pub login: Box<str>,
	#[serde(default)]
	pub name: Option<Box<str>>,
	#[serde(default)]
	pub avatar_url: Option<Box<str>>,
}

pub struct GithubOauth {
	client_id: Box<str>,
	client_secret: Box<str>,
	client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl GithubOauth {
	pub fn new(client_id: impl Into<Box<str>>, client_secret: impl Into<Box<str>>) -> SrvResult<Self> {
		let connector = HttpsConnectorBuilder::new()
			.with_native_roots()
			.map_err(|_| Error::ConfigError("no native root CA certificates found".into()))?
			.https_only()
			.enable_http1()
			.build();

		Ok(Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			client: Client::builder(TokioExecutor::new()).build(connector),
		})
	}

	pub fn authorize_url(&self, redirect_uri: &str) -> String {
		let query = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("client_id", &self.client_id)
			.append_pair("redirect_uri", redirect_uri)
			.append_pair("scope", "read:user")
			.finish();
		format!("{}?{}", AUTHORIZE_URL, query)
	}

	/// Trade the authorization code for an access token.
	pub async fn exchange_code(&self, code: &str) -> SrvResult<Box<str>> {
		let body = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("client_id", &self.client_id)
			.append_pair("client_secret", &self.client_secret)
			.append_pair("code", code)
			.finish();

		let req = Request::builder()
			.method(Method::POST)
			.uri(TOKEN_URL)
			.header(header::ACCEPT, "application/json")
			.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
			.body(Full::new(Bytes::from(body)))?;

		let res = timeout(REQUEST_TIMEOUT, self.client.request(req))
			.await
			.map_err(|_| Error::Timeout)??;
		if !res.status().is_success() {
			return Err(Error::NetworkError("token exchange failed".into()));
		}
		let bytes = timeout(REQUEST_TIMEOUT, res.into_body().collect())
			.await
			.map_err(|_| Error::Timeout)??
			.to_bytes();

		#[derive(Deserialize)]
		struct TokenRes {
			access_token: Option<Box<str>>,
		}
		let token: TokenRes = serde_json::from_slice(&bytes)?;
		token.access_token.ok_or(Error::Unauthorized)
	}

	/// Fetch the authenticated user's profile.
	pub async fn fetch_user(&self, access_token: &str) -> SrvResult<GithubUser> {
		let req = Request::builder()
			.method(Method::GET)
			.uri(USER_URL)
			.header(header::ACCEPT, "application/vnd.github+json")
			.header(header::AUTHORIZATION, format!("Bearer {}", access_token))
			.header(header::USER_AGENT, concat!("liveshare-relay/", env!("CARGO_PKG_VERSION")))
			.body(Full::new(Bytes::new()))?;

		let res = timeout(REQUEST_TIMEOUT, self.client.request(req))
			.await
			.map_err(|_| Error::Timeout)??;
		if !res.status().is_success() {
			return Err(Error::Unauthorized);
		}
		let bytes = timeout(REQUEST_TIMEOUT, res.into_body().collect())
			.await
			.map_err(|_| Error::Timeout)??
			.to_bytes();

		Ok(serde_json::from_slice(&bytes)?)
	}
}

impl std::fmt::Debug for GithubOauth {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GithubOauth").field("client_id", &self.client_id).finish()
	}
}

/// `GET /auth/github`
pub async fn get_auth_github(State(app): State<App>, headers: HeaderMap) -> SrvResult<Redirect> {
	let github = app.github.as_ref().ok_or(Error::NotFound)?;
	let host = headers
		.get(header::HOST)
		.and_then(|h| h.to_str().ok())
		.ok_or_else(|| Error::ValidationError("missing Host header".into()))?;
	let scheme = if app.opts.tls { "https" } else { "http" };
	let redirect_uri = format!("{}://{}/auth/github/callback", scheme, host);

	Ok(Redirect::temporary(&github.authorize_url(&redirect_uri)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
	pub code: Option<String>,
}

/// `GET /auth/github/callback`
pub async fn get_auth_github_callback(
	State(app): State<App>,
	Query(query): Query<CallbackQuery>,
) -> SrvResult<Html<String>> {
	let github = app.github.as_ref().ok_or(Error::NotFound)?;
	let identity = app.identity.as_ref().ok_or(Error::NotFound)?;
	let code = query.code.ok_or_else(|| Error::ValidationError("missing code".into()))?;

	let access_token = github.exchange_code(&code).await?;
	let user = github.fetch_user(&access_token).await?;
	info!("Issued identity token for github user {}", user.login);

	let now = Timestamp::now();
	let claims = IdentityClaims {
		sub: format!("github:{}", user.id),
		username: user.login.to_string(),
		name: user.name.as_deref().unwrap_or(&user.login).to_string(),
		avatar_url: user.avatar_url.map(Into::into),
		iat: now.0,
		exp: now.0 + TOKEN_TTL_SECS,
	};
	let token = identity.issue(&claims)?;

	Ok(Html(auth_complete_page(&token)))
}

/// Tiny page that hands the token to the opener window and closes itself.
/// The token alphabet is base64url plus dots, so embedding it verbatim in a
/// script string is safe.
fn auth_complete_page(token: &str) -> String {
	format!(
		"<!doctype html><html><body><script>\n\
		if (window.opener) {{\n\
			window.opener.postMessage({{ type: \"liveshare-auth\", token: \"{}\" }}, \"*\");\n\
			window.close();\n\
		}}\n\
		</script><p>Authentication complete. You can close this window.</p></body></html>",
		token
	)
}


// vim: ts=4
