//! Rate Limit Manager
//!
//! Resolves the caller's address and runs the admission check against the
//! durable window adapter, retrying the identical call on the fallback
//! adapter when the durable one reports a storage error. Storage errors are
//! never returned from [`RateLimitManager::admit`]: every call produces one
//! decision from one backend.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use futures::future::{BoxFuture, FutureExt};

use super::api::{RateLimitApi, RateLimiterStats};
use super::config::{FailureMode, RateLimitConfig};
use super::extractors::IpResolver;
use crate::prelude::*;

/// Main rate limit manager
pub struct RateLimitManager {
	/// Transactional adapter, None if it could not be opened at startup
	durable: Option<Arc<dyn WindowAdapter>>,
	fallback: Arc<dyn WindowAdapter>,
	resolver: IpResolver,
	policy: WindowPolicy,
	failure_mode: FailureMode,
	clock: Arc<dyn Clock>,
	/// Statistics
	total_admitted: AtomicU64,
	total_rate_limited: AtomicU64,
	total_banned: AtomicU64,
	total_fallback_calls: AtomicU64,
	total_storage_failures: AtomicU64,
}

impl RateLimitManager {
	/// Create a new rate limit manager
	pub fn new(
		config: RateLimitConfig,
		durable: Option<Arc<dyn WindowAdapter>>,
		fallback: Arc<dyn WindowAdapter>,
	) -> Self {
		match &durable {
			Some(adapter) => info!(
				"Rate limiter using {} adapter, {} as fallback",
				adapter.name(),
				fallback.name()
			),
			None => warn!("Rate limiter has no durable adapter, using {} only", fallback.name()),
		}

		Self {
			durable,
			fallback,
			resolver: IpResolver::new(config.trusted_proxies),
			policy: config.policy,
			failure_mode: config.failure_mode,
			clock: Arc::new(SystemClock),
			total_admitted: AtomicU64::new(0),
			total_rate_limited: AtomicU64::new(0),
			total_banned: AtomicU64::new(0),
			total_fallback_calls: AtomicU64::new(0),
			total_storage_failures: AtomicU64::new(0),
		}
	}

	/// Replace the time source
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn policy(&self) -> &WindowPolicy {
		&self.policy
	}

	pub fn resolver(&self) -> &IpResolver {
		&self.resolver
	}

	/// Check a request against the default policy
	pub async fn admit(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> Decision {
		self.admit_with(headers, remote, &self.policy).await
	}

	/// Check a request against a specific policy
	pub async fn admit_with(
		&self,
		headers: &HeaderMap,
		remote: Option<SocketAddr>,
		policy: &WindowPolicy,
	) -> Decision {
		let address = self.resolver.resolve(headers, remote);
		self.admit_address(&address, policy).await
	}

	/// Check a request whose source address is already resolved
	pub async fn admit_address(&self, address: &str, policy: &WindowPolicy) -> Decision {
		let now = self.clock.now();
		let res = self
			.with_failover("admit", move |adapter| {
				async move { adapter.check_and_admit(address, policy, now).await }.boxed()
			})
			.await;

		let decision = res.unwrap_or_else(|err| {
			self.total_storage_failures.fetch_add(1, Ordering::Relaxed);
			error!("Rate limit check for {} failed on every adapter: {}", address, err);
			self.failure_decision(policy)
		});

		match decision.deny_reason() {
			None => {
				self.total_admitted.fetch_add(1, Ordering::Relaxed);
			}
			Some(DenyReason::RateLimited) => {
				self.total_rate_limited.fetch_add(1, Ordering::Relaxed);
				debug!("Rate limited {}", address);
			}
			Some(DenyReason::Banned) => {
				self.total_banned.fetch_add(1, Ordering::Relaxed);
				debug!("Rejected banned address {}", address);
			}
		}

		decision
	}

	fn failure_decision(&self, policy: &WindowPolicy) -> Decision {
		match self.failure_mode {
			FailureMode::Open => Decision::Allowed,
			FailureMode::Closed => Decision::rate_limited(policy.window_secs()),
		}
	}

	/// Run `f` on the durable adapter, then on the fallback adapter if the
	/// durable one is missing or reported a storage error
	async fn with_failover<'a, T>(
		&self,
		op: &str,
		f: impl Fn(Arc<dyn WindowAdapter>) -> BoxFuture<'a, WdResult<T>>,
	) -> WdResult<T> {
		if let Some(durable) = &self.durable {
			match f(Arc::clone(durable)).await {
				Ok(res) => return Ok(res),
				Err(err) if err.is_storage_error() => {
					warn!(
						"{} on {} adapter failed, degrading to {} adapter: {}",
						op,
						durable.name(),
						self.fallback.name(),
						err
					);
				}
				Err(err) => return Err(err),
			}
		}

		self.total_fallback_calls.fetch_add(1, Ordering::Relaxed);
		f(Arc::clone(&self.fallback)).await
	}
}

#[async_trait]
impl RateLimitApi for RateLimitManager {
	async fn ban(&self, address: &str, duration: Option<Duration>, reason: &str) -> WdResult<()> {
		let now = self.clock.now();
		let expiry = duration.map(|d| now.add_seconds(d.as_secs()));
		self.with_failover("ban", move |adapter| {
			async move { adapter.ban(address, expiry, reason, now).await }.boxed()
		})
		.await?;

		match expiry {
			Some(expiry) => info!("Banned {} until {}: {}", address, expiry, reason),
			None => info!("Banned {} permanently: {}", address, reason),
		}
		Ok(())
	}

	async fn unban(&self, address: &str) -> WdResult<bool> {
		let res = self
			.with_failover("unban", move |adapter| {
				async move { adapter.unban(address).await }.boxed()
			})
			.await?;
		if res {
			info!("Unbanned {}", address);
		}
		Ok(res)
	}

	async fn status(&self, address: &str) -> WdResult<Option<RateRecord>> {
		let now = self.clock.now();
		let rec = self
			.with_failover("status", move |adapter| {
				async move { adapter.read_record(address).await }.boxed()
			})
			.await?;
		Ok(rec.map(|rec| rec.current(now)))
	}

	async fn list_bans(&self) -> WdResult<Vec<RateRecord>> {
		let now = self.clock.now();
		let records = self
			.with_failover("list", |adapter| async move { adapter.list_records().await }.boxed())
			.await?;
		Ok(records.into_iter().filter(|rec| rec.is_ban_active(now)).collect())
	}

	fn stats(&self) -> RateLimiterStats {
		RateLimiterStats {
			total_admitted: self.total_admitted.load(Ordering::Relaxed),
			total_rate_limited: self.total_rate_limited.load(Ordering::Relaxed),
			total_banned: self.total_banned.load(Ordering::Relaxed),
			total_fallback_calls: self.total_fallback_calls.load(Ordering::Relaxed),
			total_storage_failures: self.total_storage_failures.load(Ordering::Relaxed),
			durable_configured: self.durable.is_some(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::sync::atomic::AtomicI64;
	use std::sync::Mutex;
	use warden_types::window::{self, DEFAULT_BAN_REASON};

	#[derive(Debug, Default)]
	struct ManualClock(AtomicI64);

	impl ManualClock {
		fn set(&self, t: i64) {
			self.0.store(t, Ordering::SeqCst);
		}
	}

	impl Clock for ManualClock {
		fn now(&self) -> Timestamp {
			Timestamp(self.0.load(Ordering::SeqCst))
		}
	}

	/// In-memory adapter applying the shared decision table
	#[derive(Debug, Default)]
	struct MemoryAdapter {
		records: Mutex<HashMap<Box<str>, RateRecord>>,
		calls: AtomicU64,
	}

	#[async_trait]
	impl WindowAdapter for MemoryAdapter {
		fn name(&self) -> &'static str {
			"memory"
		}

		async fn check_and_admit(
			&self,
			address: &str,
			policy: &WindowPolicy,
			now: Timestamp,
		) -> WdResult<Decision> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let mut records = self.records.lock().unwrap();
			let (rec, decision) = window::evaluate(records.remove(address), address, policy, now);
			records.insert(address.into(), rec);
			Ok(decision)
		}

		async fn ban(
			&self,
			address: &str,
			expiry: Option<Timestamp>,
			reason: &str,
			now: Timestamp,
		) -> WdResult<()> {
			let mut records = self.records.lock().unwrap();
			records
				.entry(address.into())
				.or_insert_with(|| RateRecord::new(address, now))
				.apply_ban(expiry, reason);
			Ok(())
		}

		async fn unban(&self, address: &str) -> WdResult<bool> {
			let mut records = self.records.lock().unwrap();
			Ok(records.get_mut(address).filter(|r| r.is_banned).map(RateRecord::clear_ban).is_some())
		}

		async fn read_record(&self, address: &str) -> WdResult<Option<RateRecord>> {
			Ok(self.records.lock().unwrap().get(address).cloned())
		}

		async fn list_records(&self) -> WdResult<Vec<RateRecord>> {
			Ok(self.records.lock().unwrap().values().cloned().collect())
		}

		async fn import_record(&self, record: &RateRecord) -> WdResult<()> {
			self.records.lock().unwrap().insert(record.address.clone(), record.clone());
			Ok(())
		}
	}

	/// Adapter whose storage is always unreachable
	#[derive(Debug, Default)]
	struct DownAdapter {
		calls: AtomicU64,
	}

	impl DownAdapter {
		fn fail<T>(&self) -> WdResult<T> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Err(Error::StorageUnavailable("connection refused".into()))
		}
	}

	#[async_trait]
	impl WindowAdapter for DownAdapter {
		fn name(&self) -> &'static str {
			"down"
		}
		async fn check_and_admit(&self, _: &str, _: &WindowPolicy, _: Timestamp) -> WdResult<Decision> {
			self.fail()
		}
		async fn ban(&self, _: &str, _: Option<Timestamp>, _: &str, _: Timestamp) -> WdResult<()> {
			self.fail()
		}
		async fn unban(&self, _: &str) -> WdResult<bool> {
			self.fail()
		}
		async fn read_record(&self, _: &str) -> WdResult<Option<RateRecord>> {
			self.fail()
		}
		async fn list_records(&self) -> WdResult<Vec<RateRecord>> {
			self.fail()
		}
		async fn import_record(&self, _: &RateRecord) -> WdResult<()> {
			self.fail()
		}
	}

	fn manager(
		config: RateLimitConfig,
		durable: Option<Arc<dyn WindowAdapter>>,
		fallback: Arc<dyn WindowAdapter>,
	) -> (RateLimitManager, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::default());
		let manager = RateLimitManager::new(config, durable, fallback).with_clock(clock.clone());
		(manager, clock)
	}

	fn peer() -> Option<SocketAddr> {
		"1.2.3.4:5000".parse().ok()
	}

	#[tokio::test]
	async fn test_example_scenario() {
		let durable = Arc::new(MemoryAdapter::default());
		let (manager, clock) =
			manager(RateLimitConfig::default(), Some(durable), Arc::new(MemoryAdapter::default()));
		let headers = HeaderMap::new();

		for t in 0..3 {
			clock.set(t);
			assert_eq!(manager.admit(&headers, peer()).await, Decision::Allowed);
		}
		clock.set(3);
		assert_eq!(manager.admit(&headers, peer()).await, Decision::rate_limited(57));

		for t in 4..10 {
			clock.set(t);
			manager.admit(&headers, peer()).await;
		}
		clock.set(100);
		assert_eq!(manager.admit(&headers, peer()).await.deny_reason(), Some(DenyReason::Banned));

		clock.set(3700);
		assert_eq!(manager.admit(&headers, peer()).await, Decision::Allowed);

		let stats = manager.stats();
		assert_eq!(stats.total_admitted, 4);
		assert_eq!(stats.total_rate_limited, 6);
		assert_eq!(stats.total_banned, 2);
		assert_eq!(stats.total_fallback_calls, 0);
	}

	#[tokio::test]
	async fn test_durable_failure_falls_back_once_per_call() {
		let durable = Arc::new(DownAdapter::default());
		let fallback = Arc::new(MemoryAdapter::default());
		let (manager, _clock) =
			manager(RateLimitConfig::default(), Some(durable.clone()), fallback.clone());

		for _ in 0..4 {
			manager.admit(&HeaderMap::new(), peer()).await;
		}

		assert_eq!(durable.calls.load(Ordering::SeqCst), 4);
		assert_eq!(fallback.calls.load(Ordering::SeqCst), 4);
		let rec = fallback.read_record("1.2.3.4").await.unwrap();
		assert_eq!(rec.map(|r| r.request_count), Some(4));
		assert_eq!(manager.stats().total_fallback_calls, 4);
	}

	#[tokio::test]
	async fn test_healthy_durable_never_touches_fallback() {
		let durable = Arc::new(MemoryAdapter::default());
		let fallback = Arc::new(MemoryAdapter::default());
		let (manager, _clock) =
			manager(RateLimitConfig::default(), Some(durable.clone()), fallback.clone());

		manager.admit(&HeaderMap::new(), peer()).await;

		assert_eq!(durable.calls.load(Ordering::SeqCst), 1);
		assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_missing_durable_uses_fallback() {
		let fallback = Arc::new(MemoryAdapter::default());
		let (manager, _clock) = manager(RateLimitConfig::default(), None, fallback.clone());

		assert_eq!(manager.admit(&HeaderMap::new(), peer()).await, Decision::Allowed);
		assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
		assert!(!manager.stats().durable_configured);
	}

	#[tokio::test]
	async fn test_all_adapters_down_fails_open() {
		let (manager, _clock) = manager(
			RateLimitConfig::default(),
			Some(Arc::new(DownAdapter::default())),
			Arc::new(DownAdapter::default()),
		);

		assert_eq!(manager.admit(&HeaderMap::new(), peer()).await, Decision::Allowed);
		assert_eq!(manager.stats().total_storage_failures, 1);
	}

	#[tokio::test]
	async fn test_all_adapters_down_fails_closed() {
		let config = RateLimitConfig::default().failure_mode(FailureMode::Closed);
		let (manager, _clock) = manager(config, None, Arc::new(DownAdapter::default()));

		assert_eq!(manager.admit(&HeaderMap::new(), peer()).await, Decision::rate_limited(60));
	}

	#[tokio::test]
	async fn test_custom_policy() {
		let (manager, _clock) =
			manager(RateLimitConfig::default(), None, Arc::new(MemoryAdapter::default()));
		let policy = WindowPolicy::new(1, 10).unwrap();

		assert!(manager.admit_with(&HeaderMap::new(), peer(), &policy).await.is_allowed());
		assert_eq!(
			manager.admit_with(&HeaderMap::new(), peer(), &policy).await,
			Decision::rate_limited(10)
		);
	}

	#[tokio::test]
	async fn test_forwarded_addresses_counted_separately() {
		let (manager, _clock) =
			manager(RateLimitConfig::default(), None, Arc::new(MemoryAdapter::default()));

		let mut a = HeaderMap::new();
		a.insert("x-forwarded-for", "198.51.100.1".parse().unwrap());
		let mut b = HeaderMap::new();
		b.insert("x-forwarded-for", "198.51.100.2".parse().unwrap());

		for _ in 0..3 {
			assert!(manager.admit(&a, peer()).await.is_allowed());
		}
		assert!(!manager.admit(&a, peer()).await.is_allowed());
		assert!(manager.admit(&b, peer()).await.is_allowed());
	}

	#[tokio::test]
	async fn test_ban_administration() {
		let durable = Arc::new(MemoryAdapter::default());
		let (manager, clock) =
			manager(RateLimitConfig::default(), Some(durable), Arc::new(MemoryAdapter::default()));
		clock.set(1000);

		manager.ban("6.6.6.6", Some(Duration::from_secs(600)), "spam").await.unwrap();
		manager.ban("7.7.7.7", None, "abuse").await.unwrap();

		let policy = WindowPolicy::default();
		assert_eq!(
			manager.admit_address("6.6.6.6", &policy).await,
			Decision::banned(Some(600), Some("spam"))
		);

		let bans = manager.list_bans().await.unwrap();
		assert_eq!(bans.len(), 2);

		clock.set(1601);
		assert_eq!(manager.list_bans().await.unwrap().len(), 1);
		assert!(manager.admit_address("6.6.6.6", &policy).await.is_allowed());

		assert!(manager.unban("7.7.7.7").await.unwrap());
		let status = manager.status("7.7.7.7").await.unwrap();
		assert!(status.is_some_and(|r| !r.is_banned));
		assert!(manager.admit_address("7.7.7.7", &policy).await.is_allowed());
	}

	#[tokio::test]
	async fn test_status_hides_lapsed_ban() {
		let durable = Arc::new(MemoryAdapter::default());
		let (manager, clock) = manager(
			RateLimitConfig::default(),
			Some(durable.clone()),
			Arc::new(MemoryAdapter::default()),
		);
		clock.set(1000);
		manager.ban("6.6.6.6", Some(Duration::from_secs(60)), "spam").await.unwrap();

		let status = manager.status("6.6.6.6").await.unwrap();
		assert!(status.is_some_and(|r| r.is_banned));

		clock.set(1060);
		let status = manager.status("6.6.6.6").await.unwrap();
		assert!(status.is_some_and(|r| !r.is_banned && r.ban_reason.is_none()));
		assert!(manager.list_bans().await.unwrap().is_empty());

		// Read only, the stored record still carries the lapsed ban
		let stored = durable.read_record("6.6.6.6").await.unwrap();
		assert!(stored.is_some_and(|r| r.is_banned));
	}

	#[tokio::test]
	async fn test_ban_falls_back_when_durable_down() {
		let fallback = Arc::new(MemoryAdapter::default());
		let (manager, _clock) = manager(
			RateLimitConfig::default(),
			Some(Arc::new(DownAdapter::default())),
			fallback.clone(),
		);

		manager.ban("8.8.4.4", None, DEFAULT_BAN_REASON).await.unwrap();
		let rec = fallback.read_record("8.8.4.4").await.unwrap();
		assert!(rec.is_some_and(|r| r.is_banned));
	}
}

// vim: ts=4
