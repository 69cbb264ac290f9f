//! Adapter-local error type, folded into the server error at the boundary.

#[derive(Debug)]
pub enum Error {
	/// Database-level failures (open, transaction, table access)
	DbError(String),
	/// Filesystem failures (storage directory creation)
	IoError(String),
	/// The store was already closed
	Closed,
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::DbError(msg) => write!(f, "redb error: {}", msg),
			Error::IoError(msg) => write!(f, "io error: {}", msg),
			Error::Closed => write!(f, "store is closed"),
		}
	}
}

impl std::error::Error for Error {}

impl From<Error> for liveshare::error::Error {
	fn from(err: Error) -> Self {
		liveshare::error::Error::StoreError(err.to_string())
	}
}

// vim: ts=4
