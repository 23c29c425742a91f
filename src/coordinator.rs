//! Single-flight token renewal shared by every request that hits a `401`.
//!
//! The coordinator is a two-state machine (`Idle`, `InProgress`). The first caller that observes
//! `Idle` flips the state under one lock (test-and-set), opens a fresh broadcast channel, and
//! starts a renewal cycle on a detached task. Every caller, including the one that started the
//! cycle, then waits on that channel and replays with the single resulting token (or fails with
//! the same session error). The broadcast is a `watch` channel, so each waiter reads the outcome
//! independently; late subscribers still see the published value.
//!
//! The cycle does not belong to any caller: dropping the request that triggered it leaves the
//! renewal running for everyone else. If the cycle itself dies without publishing (a panicking
//! renewer, a runtime shutting down), the state returns to `Idle` and waiters fail with
//! [`RenewalError::Abandoned`], which is not a session-invalid outcome.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::RenewalError,
	http::{HttpRequest, HttpResponse, attach_bearer},
	renewal::TokenRenewer,
	store::{StoreError, TokenStore},
};

type RefreshOutcome = Result<AccessToken, Arc<RenewalError>>;
type OutcomeReceiver = watch::Receiver<Option<RefreshOutcome>>;
type OutcomeSender = watch::Sender<Option<RefreshOutcome>>;

enum RefreshState {
	Idle,
	InProgress(OutcomeReceiver),
}

enum Role {
	Leader(CycleGuard, OutcomeReceiver),
	Follower(OutcomeReceiver),
}

/// Coordinates token renewals so at most one is in flight at any instant.
///
/// Owned by the pipeline construction root and shared behind `Arc`; it holds no global state.
/// Renewal cycles run on the ambient Tokio runtime.
pub struct RefreshCoordinator {
	shared: Arc<Shared>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator persisting tokens under `token_key`.
	pub fn new(
		renewer: Arc<dyn TokenRenewer>,
		store: Arc<dyn TokenStore>,
		token_key: impl Into<String>,
	) -> Self {
		Self {
			shared: Arc::new(Shared {
				renewer,
				store,
				token_key: token_key.into(),
				state: Mutex::new(RefreshState::Idle),
				metrics: RefreshMetrics::default(),
			}),
		}
	}

	/// Counters describing renewals, waits, and reuses so far.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.shared.metrics
	}

	/// Returns true while a renewal is in flight.
	pub fn is_refreshing(&self) -> bool {
		matches!(*self.shared.state.lock(), RefreshState::InProgress(_))
	}

	/// Reads the current token from the store.
	pub async fn current_token(&self) -> Result<Option<AccessToken>> {
		Ok(self.shared.stored_token().await?)
	}

	/// Renews the token (or joins the in-flight renewal) and replays `request` with the result.
	///
	/// `failed_with` is the token the rejected request carried. `replay` dispatches the rebuilt
	/// request; its outcome becomes the result of this call. A renewal failure is returned as
	/// [`Error::Session`] to the triggering caller and every waiter alike.
	pub async fn refresh_and_retry<F, Fut>(
		&self,
		mut request: HttpRequest,
		failed_with: Option<AccessToken>,
		replay: F,
	) -> Result<HttpResponse>
	where
		F: FnOnce(HttpRequest) -> Fut,
		Fut: Future<Output = Result<HttpResponse>>,
	{
		let token = self.renewed_token(failed_with.as_ref()).await?;

		attach_bearer(&mut request, &token)?;

		replay(request).await
	}

	/// Returns a token newer than `failed_with`, renewing at most once across concurrent callers.
	///
	/// Dropping the returned future never cancels a renewal that is already running.
	pub async fn renewed_token(&self, failed_with: Option<&AccessToken>) -> Result<AccessToken> {
		let rx = match self.enter() {
			Role::Leader(cycle, rx) => {
				let shared = self.shared.clone();
				let failed_with = failed_with.cloned();

				tokio::spawn(async move { shared.run_cycle(cycle, failed_with).await });

				rx
			},
			Role::Follower(rx) => {
				self.shared.metrics.record_wait();

				rx
			},
		};

		wait_for_outcome(rx).await
	}

	fn enter(&self) -> Role {
		let mut state = self.shared.state.lock();

		match &*state {
			RefreshState::InProgress(rx) => Role::Follower(rx.clone()),
			RefreshState::Idle => {
				let (tx, rx) = watch::channel(None);

				*state = RefreshState::InProgress(rx.clone());

				Role::Leader(CycleGuard { shared: self.shared.clone(), tx: Some(tx) }, rx)
			},
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("token_key", &self.shared.token_key)
			.field("refreshing", &self.is_refreshing())
			.field("metrics", &self.shared.metrics)
			.finish()
	}
}

struct Shared {
	renewer: Arc<dyn TokenRenewer>,
	store: Arc<dyn TokenStore>,
	token_key: String,
	state: Mutex<RefreshState>,
	metrics: RefreshMetrics,
}
impl Shared {
	async fn stored_token(&self) -> Result<Option<AccessToken>, StoreError> {
		Ok(self.store.get(&self.token_key).await?.map(AccessToken::new))
	}

	async fn run_cycle(&self, mut cycle: CycleGuard, failed_with: Option<AccessToken>) {
		let outcome = self.renew_or_reuse(failed_with.as_ref()).await;

		cycle.publish(outcome);
	}

	async fn renew_or_reuse(&self, failed_with: Option<&AccessToken>) -> RefreshOutcome {
		let stored =
			self.stored_token().await.map_err(|e| Arc::new(RenewalError::Store(e)))?;

		// A renewal (or a rotating response) already replaced the rejected token.
		if let Some(stored) = stored.as_ref().filter(|token| Some(*token) != failed_with) {
			#[cfg(feature = "tracing")]
			tracing::debug!(
				token = %stored.fingerprint(),
				"Replaying with a token stored after the request was sent."
			);

			self.metrics.record_reuse();

			return Ok(stored.clone());
		}

		self.metrics.record_renewal();

		#[cfg(feature = "tracing")]
		tracing::debug!("Starting token renewal.");

		let outcome = match self.renewer.renew(stored.as_ref()).await {
			Ok(token) => match self.store.set(&self.token_key, token.expose().to_owned()).await {
				Ok(()) => Ok(token),
				Err(e) => Err(RenewalError::Store(e)),
			},
			Err(e) => Err(e),
		};

		match &outcome {
			Ok(_token) => {
				self.metrics.record_success();

				#[cfg(feature = "tracing")]
				tracing::debug!(token = %_token.fingerprint(), "Token renewal succeeded.");
			},
			Err(_e) => {
				self.metrics.record_failure();

				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_e, "Token renewal failed; the session is no longer valid.");
			},
		}

		outcome.map_err(Arc::new)
	}
}

/// Holds the `InProgress` state for one renewal cycle; releases it on publish or drop.
struct CycleGuard {
	shared: Arc<Shared>,
	tx: Option<OutcomeSender>,
}
impl CycleGuard {
	fn publish(&mut self, outcome: RefreshOutcome) {
		if let Some(tx) = self.tx.take() {
			*self.shared.state.lock() = RefreshState::Idle;

			tx.send_replace(Some(outcome));
		}
	}
}
impl Drop for CycleGuard {
	fn drop(&mut self) {
		if self.tx.take().is_some() {
			// Dropping the sender closes the channel so waiters stop with `Abandoned`.
			*self.shared.state.lock() = RefreshState::Idle;
		}
	}
}

async fn wait_for_outcome(mut rx: OutcomeReceiver) -> Result<AccessToken> {
	let outcome = match rx.wait_for(Option::is_some).await {
		Ok(value) => (*value).clone().unwrap_or_else(|| Err(Arc::new(RenewalError::Abandoned))),
		Err(_) => Err(Arc::new(RenewalError::Abandoned)),
	};

	outcome.map_err(Error::Session)
}
