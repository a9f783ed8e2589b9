//! Rate Limiting Middleware
//!
//! Tower middleware layer that runs the admission check before the guarded
//! route and answers denied requests itself.

use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use tower::{Layer, Service};

use super::error::RateLimitError;
use super::limiter::RateLimitManager;
use crate::prelude::*;

/// Rate limit middleware layer
#[derive(Clone)]
pub struct RateLimitLayer {
	manager: Arc<RateLimitManager>,
	policy: Option<Arc<WindowPolicy>>,
}

impl RateLimitLayer {
	/// Guard routes with the manager's default policy
	pub fn new(manager: Arc<RateLimitManager>) -> Self {
		Self { manager, policy: None }
	}

	/// Guard routes with a route specific policy
	pub fn with_policy(manager: Arc<RateLimitManager>, policy: WindowPolicy) -> Self {
		Self { manager, policy: Some(Arc::new(policy)) }
	}
}

impl<S> Layer<S> for RateLimitLayer {
	type Service = RateLimitService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		RateLimitService { inner, manager: self.manager.clone(), policy: self.policy.clone() }
	}
}

/// Rate limit middleware service
#[derive(Clone)]
pub struct RateLimitService<S> {
	inner: S,
	manager: Arc<RateLimitManager>,
	policy: Option<Arc<WindowPolicy>>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
	S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let manager = self.manager.clone();
		let policy = self.policy.clone();
		let mut inner = self.inner.clone();

		Box::pin(async move {
			let remote =
				req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
			let policy = policy.as_deref().unwrap_or(manager.policy());

			if let Decision::Denied(denial) = manager.admit_with(req.headers(), remote, policy).await
			{
				return Ok(RateLimitError::from(denial).into_response());
			}

			inner.call(req).await
		})
	}
}

// vim: ts=4
