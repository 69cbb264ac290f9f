use std::{env, sync::Arc};

use liveshare_doc_store_redb::DocStoreRedb;

#[tokio::main]
async fn main() {
	let port = env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()).unwrap_or(4321);
	let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "./data/yjs-docs".to_string());

	let store =
		Arc::new(DocStoreRedb::new(&data_dir).expect("FATAL: cannot open document store"));

	let mut builder = liveshare::Builder::new();
	builder.listen(format!("0.0.0.0:{}", port)).store(store);

	if let (Ok(cert), Ok(key)) = (env::var("TLS_CERT"), env::var("TLS_KEY")) {
		builder.tls(cert, key);
	}
	if matches!(env::var("REQUIRE_GITHUB_AUTH").as_deref(), Ok("true")) {
		builder.require_identity(true);
	}
	if let Ok(secret) = env::var("JWT_SECRET") {
		builder.jwt_secret(secret);
	}
	if let (Ok(id), Ok(secret)) = (env::var("GITHUB_CLIENT_ID"), env::var("GITHUB_CLIENT_SECRET")) {
		builder.github_client(id, secret);
	}
	if let Ok(origin) = env::var("CORS_ORIGIN") {
		builder.cors_origin(origin);
	}

	builder.run().await.expect("FATAL: server failed");
}

// vim: ts=4
