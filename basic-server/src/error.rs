use axum::{http::StatusCode, response::IntoResponse, Json};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	NotFound,
	PermissionDenied,
	BadRequest(String),
	Warden(warden_types::error::Error),
}

impl From<warden_types::error::Error> for Error {
	fn from(err: warden_types::error::Error) -> Self {
		match err {
			warden_types::error::Error::NotFound => Self::NotFound,
			err => Self::Warden(err),
		}
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::BadRequest(msg) => write!(f, "bad request: {}", msg),
			Error::Warden(err) => write!(f, "{}", err),
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code) = match &self {
			Error::NotFound => (StatusCode::NOT_FOUND, "not_found"),
			Error::PermissionDenied => (StatusCode::FORBIDDEN, "permission_denied"),
			Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
			Error::Warden(err) => {
				tracing::error!("Request failed: {}", err);
				(StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
			}
		};
		let body = serde_json::json!({ "error": { "code": code, "message": self.to_string() } });
		(status, Json(body)).into_response()
	}
}

// vim: ts=4
