//! HTTP routes: a guarded demo endpoint and ban administration

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::{header::AUTHORIZATION, request::Parts, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use warden_core::rate_limit::{RateLimitApi, RateLimiterStats};
use warden_core::{RateLimitLayer, RateLimitManager};

use crate::error::{Error, Result};
use crate::prelude::*;

#[derive(Clone)]
pub struct AppState {
	pub manager: Arc<RateLimitManager>,
	pub admin_token: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
	let guarded = Router::new()
		.route("/api/hello", get(get_hello))
		.layer(RateLimitLayer::new(state.manager.clone()));

	let admin = Router::new()
		.route("/api/admin/bans", get(list_bans).post(post_ban))
		.route("/api/admin/bans/{address}", axum::routing::delete(delete_ban))
		.route("/api/admin/status/{address}", get(get_status))
		.route("/api/admin/stats", get(get_stats));

	Router::new()
		.route("/health", get(|| async { "ok" }))
		.merge(guarded)
		.merge(admin)
		.with_state(state)
}

// AdminAuth //
//***********//
/// Bearer token check for the admin endpoints
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
	type Rejection = Error;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
		let token = parts
			.headers
			.get(AUTHORIZATION)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.strip_prefix("Bearer "));

		match (&state.admin_token, token) {
			(Some(expected), Some(token)) if **expected == *token => Ok(AdminAuth),
			_ => Err(Error::PermissionDenied),
		}
	}
}

/// GET /api/hello - demo endpoint behind the rate limiter
async fn get_hello() -> Json<serde_json::Value> {
	Json(json!({ "message": "hello" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
	pub address: String,
	/// Ban length in seconds (None = permanent)
	pub duration_secs: Option<u64>,
	pub reason: Option<String>,
}

/// POST /api/admin/bans - ban an address
async fn post_ban(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Json(req): Json<BanRequest>,
) -> Result<(StatusCode, Json<RateRecord>)> {
	let address = req.address.trim();
	if address.is_empty() {
		return Err(Error::BadRequest("address is required".into()));
	}
	let reason = req.reason.as_deref().unwrap_or(state.manager.policy().reason());

	state.manager.ban(address, req.duration_secs.map(Duration::from_secs), reason).await?;
	let rec = state.manager.status(address).await?.ok_or(Error::NotFound)?;
	Ok((StatusCode::CREATED, Json(rec)))
}

/// DELETE /api/admin/bans/{address} - lift a ban
async fn delete_ban(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Path(address): Path<String>,
) -> Result<Json<serde_json::Value>> {
	let unbanned = state.manager.unban(&address).await?;
	Ok(Json(json!({ "address": address, "unbanned": unbanned })))
}

/// GET /api/admin/bans - active bans
async fn list_bans(State(state): State<AppState>, _auth: AdminAuth) -> Result<Json<Vec<RateRecord>>> {
	Ok(Json(state.manager.list_bans().await?))
}

async fn get_status(
	State(state): State<AppState>,
	_auth: AdminAuth,
	Path(address): Path<String>,
) -> Result<Json<RateRecord>> {
	state.manager.status(&address).await?.map(Json).ok_or(Error::NotFound)
}

async fn get_stats(State(state): State<AppState>, _auth: AdminAuth) -> Json<RateLimiterStats> {
	Json(state.manager.stats())
}


// vim: ts=4
