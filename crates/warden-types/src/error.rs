//! Error type shared by the core crate and the window adapters.
//!
//! Rate limit denials are not errors: they are returned as
//! [`Decision::Denied`](crate::window::Decision) values.

pub type WdResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	DbError,
	Parse,
	/// Invalid limiter configuration (fatal at startup)
	ConfigurationInvalid(String),
	/// Storage backend unreachable or transaction failed
	StorageUnavailable(String),

	// externals
	Io(std::io::Error),
}

impl Error {
	/// Whether the failover layer should retry this call on another backend
	pub fn is_storage_error(&self) -> bool {
		!matches!(self, Error::ConfigurationInvalid(_))
	}
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::warn!("JSON: {}", err);
		Self::Parse
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::DbError => write!(f, "database error"),
			Error::Parse => write!(f, "parse error"),
			Error::ConfigurationInvalid(msg) => write!(f, "invalid configuration: {}", msg),
			Error::StorageUnavailable(msg) => write!(f, "storage unavailable: {}", msg),
			Error::Io(err) => write!(f, "io error: {}", err),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Io(err) => Some(err),
			_ => None,
		}
	}
}


// vim: ts=4
