// Webserver implementation

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::prelude::*;

/// Serve the router until ctrl-c, plain TCP or TLS depending on whether a
/// certificate pair is configured. Returns once the listener has drained.
pub async fn serve(
	listen: &str,
	tls: Option<(PathBuf, PathBuf)>,
	router: Router,
) -> SrvResult<()> {
	let addr = SocketAddr::from_str(listen)
		.map_err(|_| Error::ConfigError(format!("invalid listen address {}", listen)))?;
	let make_service = router.into_make_service_with_connect_info::<SocketAddr>();

	match tls {
		Some((cert, key)) => {
			let config = RustlsConfig::from_pem_file(cert, key).await?;
			info!("Listening on https://{}", addr);

			let handle = axum_server::Handle::new();
			let shutdown_handle = handle.clone();
			tokio::spawn(async move {
				shutdown_signal().await;
				// Hard deadline: in-flight requests get a moment to finish
				shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
			});

			axum_server::bind_rustls(addr, config).handle(handle).serve(make_service).await?;
		}
		None => {
			let listener = tokio::net::TcpListener::bind(addr).await?;
			info!("Listening on http://{}", addr);
			axum::serve(listener, make_service)
				.with_graceful_shutdown(shutdown_signal())
				.await?;
		}
	}
	Ok(())
}

async fn shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
	info!("Shutdown signal received");
}

// vim: ts=4
