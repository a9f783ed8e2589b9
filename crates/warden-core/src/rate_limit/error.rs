//! Rate Limiting Responses
//!
//! HTTP mapping of denials for calling layers: 429 for rate limited
//! requests, 403 for banned addresses.

use std::time::Duration;

use axum::http::{header::RETRY_AFTER, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::prelude::*;

/// Denial as seen by an HTTP caller
#[derive(Debug)]
pub enum RateLimitError {
	/// Request count exceeded the limit within the window
	RateLimited {
		/// Time until the window resets
		retry_after: Duration,
	},
	/// Address is banned
	Banned {
		/// Remaining ban duration (None = permanent or just issued)
		remaining: Option<Duration>,
		reason: Option<Box<str>>,
	},
}

impl From<Denial> for RateLimitError {
	fn from(denial: Denial) -> Self {
		match denial.reason {
			DenyReason::RateLimited => RateLimitError::RateLimited {
				retry_after: Duration::from_secs(denial.retry_after_secs.unwrap_or(1)),
			},
			DenyReason::Banned => RateLimitError::Banned {
				remaining: denial.retry_after_secs.map(Duration::from_secs),
				reason: denial.message,
			},
		}
	}
}

impl std::fmt::Display for RateLimitError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			RateLimitError::RateLimited { retry_after } => {
				write!(f, "Rate limited, retry after {:?}", retry_after)
			}
			RateLimitError::Banned { remaining, .. } => {
				if let Some(dur) = remaining {
					write!(f, "Address banned for {:?}", dur)
				} else {
					write!(f, "Address banned")
				}
			}
		}
	}
}

impl std::error::Error for RateLimitError {}

impl IntoResponse for RateLimitError {
	fn into_response(self) -> Response {
		match self {
			RateLimitError::RateLimited { retry_after } => {
				let retry_secs = retry_after.as_secs();
				let body = serde_json::json!({
					"error": {
						"code": DenyReason::RateLimited.as_str(),
						"message": "Rate limit exceeded. Please wait before trying again.",
						"retryAfter": retry_secs
					}
				});

				let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
				if let Ok(val) = retry_secs.to_string().parse() {
					response.headers_mut().insert(RETRY_AFTER, val);
				}
				response
			}
			RateLimitError::Banned { remaining, reason } => {
				let body = serde_json::json!({
					"error": {
						"code": DenyReason::Banned.as_str(),
						"message": reason.as_deref().unwrap_or(
							"Your IP has been temporarily banned due to suspicious activity"
						),
						"remainingSecs": remaining.map(|d| d.as_secs())
					}
				});

				let mut response = (StatusCode::FORBIDDEN, Json(body)).into_response();
				if let Some(val) = remaining.and_then(|d| d.as_secs().to_string().parse().ok()) {
					response.headers_mut().insert(RETRY_AFTER, val);
				}
				response
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rate_limited_response() {
		let err = RateLimitError::from(Denial {
			reason: DenyReason::RateLimited,
			retry_after_secs: Some(57),
			message: None,
		});
		let response = err.into_response();
		assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
		assert_eq!(response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()), Some("57"));
	}

	#[test]
	fn test_banned_response() {
		let err = RateLimitError::from(Denial {
			reason: DenyReason::Banned,
			retry_after_secs: None,
			message: Some("Rate limit exceeded".into()),
		});
		assert_eq!(err.to_string(), "Address banned");
		let response = err.into_response();
		assert_eq!(response.status(), StatusCode::FORBIDDEN);
		assert!(response.headers().get(RETRY_AFTER).is_none());
	}
}

// vim: ts=4
