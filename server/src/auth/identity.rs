//! Identity token verification.
//!
//! Identity tokens are compact HS256 JWTs signed with a process-wide
//! symmetric secret. The verifier accepts a token only if the signature
//! matches and the expiry has not passed; both failures look identical to
//! the caller.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Claims carried by an identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
	/// Stable subject, e.g. `github:583231`.
	pub sub: String,
	pub username: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub avatar_url: Option<String>,
	pub iat: i64,
	pub exp: i64,
}

#[derive(Clone)]
pub struct IdentityVerifier {
	encoding: EncodingKey,
	decoding: DecodingKey,
	validation: Validation,
}

impl IdentityVerifier {
	pub fn new(secret: &str) -> Self {
		Self {
			encoding: EncodingKey::from_secret(secret.as_bytes()),
			decoding: DecodingKey::from_secret(secret.as_bytes()),
			validation: Validation::new(Algorithm::HS256),
		}
	}

	/// Sign a fresh identity token.
	pub fn issue(&self, claims: &IdentityClaims) -> SrvResult<String> {
		Ok(jsonwebtoken::encode(&Header::default(), claims, &self.encoding)?)
	}

	/// Verify signature and expiry. Rejections carry no detail about why.
	pub fn verify(&self, token: &str) -> SrvResult<IdentityClaims> {
		let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.decoding, &self.validation)?;
		Ok(data.claims)
	}
}

impl std::fmt::Debug for IdentityVerifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdentityVerifier").finish()
	}
}


// vim: ts=4
