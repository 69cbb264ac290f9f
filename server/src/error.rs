//! Error handling subsystem. Implements a custom Error type.

use axum::{Json, http::StatusCode, response::IntoResponse};

use crate::prelude::*;
use crate::types::ErrorResponse;

pub type SrvResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Core errors
	NotFound,
	PermissionDenied,
	Unauthorized, // 401 - missing/invalid auth token
	Parse,

	// Input validation and constraints
	ValidationError(String), // 400 - invalid input data
	RateLimited,             // 429 - too many requests from one address

	// System and configuration
	ConfigError(String), // Missing or invalid configuration
	Internal(String),    // Internal invariant violations, for debugging

	// Persistence and network
	StoreError(String),   // Embedded store read/write failures
	NetworkError(String), // Outbound HTTP failures (OAuth exchange)
	Timeout,

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code, message) = match self {
			Error::NotFound => (
				StatusCode::NOT_FOUND,
				"E-CORE-NOTFOUND".to_string(),
				"Resource not found".to_string(),
			),
			Error::PermissionDenied => (
				StatusCode::FORBIDDEN,
				"E-AUTH-NOPERM".to_string(),
				"You do not have permission to access this resource".to_string(),
			),
			Error::Unauthorized => (
				StatusCode::UNAUTHORIZED,
				"E-AUTH-UNAUTH".to_string(),
				"Authentication required or invalid token".to_string(),
			),
			Error::ValidationError(msg) => (
				StatusCode::BAD_REQUEST,
				"E-VAL-INVALID".to_string(),
				format!("Request validation failed: {}", msg),
			),
			Error::RateLimited => (
				StatusCode::TOO_MANY_REQUESTS,
				"E-RATE-LIMITED".to_string(),
				"Too many requests".to_string(),
			),
			Error::Timeout => (
				StatusCode::REQUEST_TIMEOUT,
				"E-NET-TIMEOUT".to_string(),
				"Request timeout".to_string(),
			),
			// Server errors (5xx) - no message exposure for security
			Error::StoreError(msg) => {
				warn!("store error: {}", msg);
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					"E-STORE-IOERR".to_string(),
					"Internal server error".to_string(),
				)
			}
			Error::Internal(msg) => {
				warn!("internal error: {}", msg);
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					"E-CORE-INTERNAL".to_string(),
					"Internal server error".to_string(),
				)
			}
			Error::Parse => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CORE-PARSE".to_string(),
				"Internal server error".to_string(),
			),
			Error::Io(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-SYS-IO".to_string(),
				"Internal server error".to_string(),
			),
			Error::NetworkError(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-NET-ERROR".to_string(),
				"Internal server error".to_string(),
			),
			Error::ConfigError(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CONF-CFGERR".to_string(),
				"Internal server error".to_string(),
			),
		};

		let error_response = ErrorResponse::new(code, message);
		(status, Json(error_response)).into_response()
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(_err: std::num::ParseIntError) -> Self {
		warn!("parse int error: {}", _err);
		Error::Parse
	}
}

impl From<serde_json::Error> for Error {
	fn from(_err: serde_json::Error) -> Self {
		warn!("json error: {}", _err);
		Error::Parse
	}
}

impl From<axum::Error> for Error {
	fn from(_err: axum::Error) -> Self {
		warn!("axum error: {}", _err);
		Error::NetworkError("axum error".into())
	}
}

impl From<axum::http::Error> for Error {
	fn from(_err: axum::http::Error) -> Self {
		warn!("http error: {}", _err);
		Error::NetworkError("http error".into())
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(_err: tokio::task::JoinError) -> Self {
		warn!("tokio join error: {}", _err);
		Error::Internal("task execution failed".into())
	}
}

impl From<jsonwebtoken::errors::Error> for Error {
	fn from(_err: jsonwebtoken::errors::Error) -> Self {
		// Expired and wrong-secret tokens are deliberately indistinguishable
		Error::Unauthorized
	}
}

impl From<yrs::encoding::read::Error> for Error {
	fn from(_err: yrs::encoding::read::Error) -> Self {
		debug!("lib0 decode error: {}", _err);
		Error::Parse
	}
}

impl From<yrs::sync::Error> for Error {
	fn from(_err: yrs::sync::Error) -> Self {
		debug!("sync protocol error: {}", _err);
		Error::Parse
	}
}

impl From<yrs::sync::awareness::Error> for Error {
	fn from(_err: yrs::sync::awareness::Error) -> Self {
		debug!("awareness error: {}", _err);
		Error::Parse
	}
}

impl From<hyper::Error> for Error {
	fn from(_err: hyper::Error) -> Self {
		warn!("hyper error: {}", _err);
		Error::NetworkError("HTTP client error".into())
	}
}

impl From<hyper_util::client::legacy::Error> for Error {
	fn from(_err: hyper_util::client::legacy::Error) -> Self {
		warn!("hyper error: {}", _err);
		Error::NetworkError("HTTP client error".into())
	}
}

// vim: ts=4
