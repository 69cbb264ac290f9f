//! API routes

use axum::{
	Router,
	body::Body,
	http::{HeaderValue, Request},
	routing::{delete, get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::github;
use crate::core::rate_limit::RateLimitLayer;
use crate::gateway;
use crate::prelude::*;
use crate::room;

pub fn init(app: App) -> Router {
	// Room lifecycle shares one budget per source address
	let rooms_router = Router::new()
		.route("/rooms", post(room::handler::post_room))
		.route("/rooms/{room_id}/join", post(room::handler::post_room_join))
		.route("/rooms/{room_id}", get(room::handler::get_room))
		.route("/rooms/{room_id}", delete(room::handler::delete_room))
		.layer(RateLimitLayer::new(app.rate_limiter.clone()));

	let cors_layer = match app.opts.cors_origin.as_ref() {
		"*" => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
		origin => match origin.parse::<HeaderValue>() {
			Ok(value) => CorsLayer::new()
				.allow_origin(AllowOrigin::exact(value))
				.allow_methods(Any)
				.allow_headers(Any),
			Err(_) => {
				warn!("Invalid CORS_ORIGIN {:?}, falling back to any", origin);
				CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
			}
		},
	};

	Router::new()
		.merge(rooms_router)
		.route("/healthz", get(room::handler::get_healthz))
		.route("/auth/github", get(github::get_auth_github))
		.route("/auth/github/callback", get(github::get_auth_github_callback))
		.route("/ws/{*doc_name}", get(gateway::get_ws_doc))
		.route("/control/{room_id}", get(gateway::get_ws_control))
		.layer(cors_layer)
		// Span carries the path only: query strings hold room tokens and
		// must never reach the logs.
		.layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
			info_span!("REQ", method = %req.method(), path = req.uri().path())
		}))
		.with_state(app)
}

// vim: ts=4
