//! Client secret acquisition for renewal calls.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::ClientSecret,
	error::SecretFetchError,
	http::HttpTransport,
	obs::{self, StageKind, StageOutcome, StageSpan},
	oauth2::http::{Method, Request, header::ACCEPT},
	renewal::{json_body, send_within, success},
};

/// Boxed future returned by [`SecretProvider::fetch_secret`].
pub type SecretFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ClientSecret, SecretFetchError>> + 'a + Send>>;

/// Source of the short-lived client secret that authorizes token renewals.
pub trait SecretProvider
where
	Self: Send + Sync,
{
	/// Fetches a fresh secret. Called once per renewal attempt; results are never cached.
	fn fetch_secret(&self) -> SecretFuture<'_>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretResponse {
	client_key: String,
}

/// [`SecretProvider`] that GETs `{ "clientKey": ... }` from the secret endpoint.
#[derive(Clone)]
pub struct HttpSecretProvider<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	endpoint: Url,
	timeout: StdDuration,
}
impl<T> HttpSecretProvider<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a provider calling `endpoint` through `transport`.
	pub fn new(transport: Arc<T>, endpoint: Url, timeout: StdDuration) -> Self {
		Self { transport, endpoint, timeout }
	}

	async fn fetch(&self) -> Result<ClientSecret, SecretFetchError> {
		let request = Request::builder()
			.method(Method::GET)
			.uri(self.endpoint.as_str())
			.header(ACCEPT, "application/json")
			.body(Vec::new())?;
		let response = send_within(&*self.transport, request, self.timeout).await?;
		let status = response.status().as_u16();

		if !success(status) {
			return Err(SecretFetchError::Rejected { status });
		}

		let body: SecretResponse = json_body(response.body())
			.map_err(|source| SecretFetchError::Parse { source, status })?;

		Ok(ClientSecret::new(&body.client_key)?)
	}
}
impl<T> SecretProvider for HttpSecretProvider<T>
where
	T: ?Sized + HttpTransport,
{
	fn fetch_secret(&self) -> SecretFuture<'_> {
		const KIND: StageKind = StageKind::Secret;

		Box::pin(async move {
			let span = StageSpan::new(KIND, "fetch_secret");

			obs::record_stage_outcome(KIND, StageOutcome::Attempt);

			let result = span.instrument(self.fetch()).await;

			match &result {
				Ok(_) => obs::record_stage_outcome(KIND, StageOutcome::Success),
				Err(_) => obs::record_stage_outcome(KIND, StageOutcome::Failure),
			}

			result
		})
	}
}
impl<T> Debug for HttpSecretProvider<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpSecretProvider")
			.field("endpoint", &self.endpoint.as_str())
			.field("timeout", &self.timeout)
			.finish()
	}
}
