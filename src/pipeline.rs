//! Request pipeline stage wrapping every outgoing call.
//!
//! [`AuthPipeline::handle`] resolves the request timeout, attaches the stored bearer token unless
//! the URL is exempt, dispatches through the [`HttpTransport`], and classifies the response. A
//! `401` on a token-bearing request is handed to the shared [`RefreshCoordinator`], which renews
//! the token once for every concurrent caller and replays the request. Successful responses that
//! carry an `Authorization` header rotate the stored token.

pub mod network;

pub use network::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::{PipelineConfig, RenewalEndpoints},
	coordinator::RefreshCoordinator,
	error::TransportError,
	http::{HttpRequest, HttpResponse, HttpTransport, attach_bearer, bearer_of, timeout_hint},
	obs::{self, StageKind, StageOutcome, StageSpan},
	oauth2::http::header::AUTHORIZATION,
	renewal::{HttpTokenRenewer, TokenRenewer},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Pipeline preconfigured for the reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestPipeline = AuthPipeline<ReqwestTransport>;

/// Interceptor that authenticates, times out, and recovers outgoing requests.
///
/// Cheap to share behind `Arc`; every clone of the `Arc` uses the same coordinator, so concurrent
/// `401`s across tasks still collapse into one renewal.
pub struct AuthPipeline<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	store: Arc<dyn TokenStore>,
	coordinator: Arc<RefreshCoordinator>,
	config: PipelineConfig,
	network: Option<NetworkWatch>,
}
impl<T> AuthPipeline<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a pipeline renewing tokens through `renewer`.
	pub fn new(
		transport: Arc<T>,
		store: Arc<dyn TokenStore>,
		renewer: Arc<dyn TokenRenewer>,
		config: PipelineConfig,
	) -> Self {
		let coordinator =
			Arc::new(RefreshCoordinator::new(renewer, store.clone(), config.token_key.clone()));

		Self { transport, store, coordinator, config, network: None }
	}

	/// Creates a pipeline renewing tokens against `endpoints` over the same transport.
	///
	/// Both endpoints are added to the exempt list so they never carry the bearer token.
	pub fn with_endpoints(
		transport: Arc<T>,
		store: Arc<dyn TokenStore>,
		endpoints: &RenewalEndpoints,
		mut config: PipelineConfig,
	) -> Self {
		let renewer = Arc::new(HttpTokenRenewer::from_endpoints(
			transport.clone(),
			endpoints,
			config.renewal_timeout,
		));

		for rule in endpoints.exempt_rules() {
			if !config.exempt_urls.contains(&rule) {
				config.exempt_urls.push(rule);
			}
		}

		Self::new(transport, store, renewer, config)
	}

	/// Consults `status` before every dispatch; offline hosts fail fast.
	pub fn with_network_status(mut self, status: Arc<dyn NetworkStatus>) -> Self {
		self.network = Some(NetworkWatch::new(status));

		self
	}

	/// Shared renewal coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Active configuration.
	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	/// Sends `request` through the pipeline.
	///
	/// Statuses below `400` resolve to the response. Everything else resolves to an [`Error`]
	/// carrying the untouched response where there is one.
	pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse> {
		const KIND: StageKind = StageKind::Dispatch;

		let span = StageSpan::new(KIND, "handle");

		obs::record_stage_outcome(KIND, StageOutcome::Attempt);

		let result = span.instrument(self.intercept(request)).await;

		match &result {
			Ok(_) => obs::record_stage_outcome(KIND, StageOutcome::Success),
			Err(_) => obs::record_stage_outcome(KIND, StageOutcome::Failure),
		}

		result
	}

	async fn intercept(&self, mut request: HttpRequest) -> Result<HttpResponse> {
		let timeout = timeout_hint(&request).unwrap_or(self.config.default_timeout);

		// Exempt requests carry no token, so a `401` on them cannot be recovered.
		if self.config.is_exempt(&request.uri().to_string()) {
			return match classify(self.dispatch(request, timeout).await?) {
				Verdict::Success(response) => Ok(response),
				Verdict::Unauthorized(response) => Err(Error::AuthExpired { response }),
				Verdict::Failed(e) => Err(e),
			};
		}

		let token = self.coordinator.current_token().await?;

		if let Some(token) = &token {
			attach_bearer(&mut request, token)?;
		}

		let pending = request.clone();

		match classify(self.dispatch(request, timeout).await?) {
			Verdict::Success(response) => {
				self.rotate(&response, token.as_ref()).await?;

				Ok(response)
			},
			Verdict::Unauthorized(_) =>
				self.coordinator
					.refresh_and_retry(pending, token, |request| self.replay(request, timeout))
					.await,
			Verdict::Failed(e) => Err(e),
		}
	}

	async fn replay(&self, request: HttpRequest, timeout: StdDuration) -> Result<HttpResponse> {
		let token = bearer_of(&request);

		match classify(self.dispatch(request, timeout).await?) {
			Verdict::Success(response) => {
				self.rotate(&response, token.as_ref()).await?;

				Ok(response)
			},
			Verdict::Unauthorized(response) => Err(Error::AuthExpired { response }),
			Verdict::Failed(e) => Err(e),
		}
	}

	async fn dispatch(&self, request: HttpRequest, timeout: StdDuration) -> Result<HttpResponse> {
		if let Some(network) = &self.network
			&& !network.is_online()
		{
			return Err(TransportError::Offline.into());
		}

		let url = request.uri().to_string();

		match tokio::time::timeout(timeout, self.transport.send(request, timeout)).await {
			Ok(Ok(response)) => Ok(response),
			Ok(Err(TransportError::TimedOut)) | Err(_) => {
				#[cfg(feature = "tracing")]
				tracing::debug!(url = %url, ?timeout, "Request timed out.");

				Err(Error::Timeout { url, timeout })
			},
			Ok(Err(e)) => Err(e.into()),
		}
	}

	/// Persists the token carried by a successful response's `Authorization` header.
	async fn rotate(&self, response: &HttpResponse, attached: Option<&AccessToken>) -> Result<()> {
		let Some(rotated) = response
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(AccessToken::from_authorization)
		else {
			return Ok(());
		};

		if attached == Some(&rotated) {
			return Ok(());
		}

		self.store.set(&self.config.token_key, rotated.expose().to_owned()).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(token = %rotated.fingerprint(), "Stored the token rotated by the server.");

		Ok(())
	}
}
impl<T> Debug for AuthPipeline<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthPipeline")
			.field("config", &self.config)
			.field("coordinator", &self.coordinator)
			.field("network", &self.network)
			.finish()
	}
}

enum Verdict {
	Success(HttpResponse),
	Unauthorized(Box<HttpResponse>),
	Failed(Error),
}

fn classify(response: HttpResponse) -> Verdict {
	let status = response.status().as_u16();

	if status < 400 {
		return Verdict::Success(response);
	}

	let response = Box::new(response);

	match status {
		401 => Verdict::Unauthorized(response),
		400 => Verdict::Failed(Error::ClientError { response }),
		500..=599 => Verdict::Failed(Error::ServerError { response }),
		_ => Verdict::Failed(Error::UnexpectedStatus { response }),
	}
}
