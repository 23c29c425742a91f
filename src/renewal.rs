//! Token renewal: trades the current access token for a new one.
//!
//! Each renewal fetches a fresh [`ClientSecret`](crate::auth::ClientSecret) from a
//! [`SecretProvider`], POSTs `{ "hashToken": <current> }` to the renewal endpoint with the secret
//! header attached, and reads the new token from the `hashToken` field of the JSON reply. The
//! renewal client talks to the raw [`HttpTransport`], never to the pipeline, so a failing renewal
//! cannot recurse into another one.

pub mod secret;

pub use secret::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::RenewalEndpoints,
	error::{RenewalError, TransportError},
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{self, StageKind, StageOutcome, StageSpan},
	oauth2::http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};

/// Boxed future returned by [`TokenRenewer::renew`].
pub type RenewFuture<'a> =
	Pin<Box<dyn Future<Output = Result<AccessToken, RenewalError>> + 'a + Send>>;

/// Performs the network exchange that produces a new access token.
pub trait TokenRenewer
where
	Self: Send + Sync,
{
	/// Renews `current` (which may be absent) and returns the replacement token.
	fn renew<'a>(&'a self, current: Option<&'a AccessToken>) -> RenewFuture<'a>;
}

#[derive(Serialize)]
struct RenewRequest<'a> {
	#[serde(rename = "hashToken")]
	hash_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RenewResponse {
	#[serde(rename = "hashToken")]
	hash_token: Option<String>,
}

/// [`TokenRenewer`] backed by an HTTP renewal endpoint and a [`SecretProvider`].
pub struct HttpTokenRenewer<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	secrets: Arc<dyn SecretProvider>,
	endpoint: Url,
	timeout: StdDuration,
}
impl<T> HttpTokenRenewer<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a renewer that POSTs to `endpoint` using secrets from `secrets`.
	pub fn new(
		transport: Arc<T>,
		secrets: Arc<dyn SecretProvider>,
		endpoint: Url,
		timeout: StdDuration,
	) -> Self {
		Self { transport, secrets, endpoint, timeout }
	}

	/// Wires a renewer + [`HttpSecretProvider`] pair sharing `transport`.
	pub fn from_endpoints(
		transport: Arc<T>,
		endpoints: &RenewalEndpoints,
		timeout: StdDuration,
	) -> Self {
		let secrets: Arc<dyn SecretProvider> = Arc::new(HttpSecretProvider::new(
			transport.clone(),
			endpoints.secret.clone(),
			timeout,
		));

		Self::new(transport, secrets, endpoints.renewal.clone(), timeout)
	}

	async fn exchange(&self, current: Option<&AccessToken>) -> Result<AccessToken, RenewalError> {
		let secret = self.secrets.fetch_secret().await?;
		let payload =
			serde_json::to_vec(&RenewRequest { hash_token: current.map(AccessToken::expose) })?;
		let mut request = Request::builder()
			.method(Method::POST)
			.uri(self.endpoint.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(payload)?;

		secret.apply(request.headers_mut());

		let response = send_within(&*self.transport, request, self.timeout).await?;
		let status = response.status().as_u16();

		if !success(status) {
			return Err(RenewalError::Rejected { status });
		}

		let body: RenewResponse =
			json_body(response.body()).map_err(|source| RenewalError::Parse { source, status })?;

		body.hash_token
			.filter(|token| !token.trim().is_empty())
			.map(AccessToken::new)
			.ok_or(RenewalError::MissingToken)
	}
}
impl<T> TokenRenewer for HttpTokenRenewer<T>
where
	T: ?Sized + HttpTransport,
{
	fn renew<'a>(&'a self, current: Option<&'a AccessToken>) -> RenewFuture<'a> {
		const KIND: StageKind = StageKind::Renewal;

		Box::pin(async move {
			let span = StageSpan::new(KIND, "renew");

			obs::record_stage_outcome(KIND, StageOutcome::Attempt);

			let result = span.instrument(self.exchange(current)).await;

			match &result {
				Ok(_) => obs::record_stage_outcome(KIND, StageOutcome::Success),
				Err(_) => obs::record_stage_outcome(KIND, StageOutcome::Failure),
			}

			result
		})
	}
}
impl<T> Debug for HttpTokenRenewer<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpTokenRenewer")
			.field("endpoint", &self.endpoint.as_str())
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Sends `request`, giving up with [`TransportError::TimedOut`] once `timeout` elapses even if
/// the transport ignores its deadline.
pub(crate) async fn send_within<T>(
	transport: &T,
	request: HttpRequest,
	timeout: StdDuration,
) -> Result<HttpResponse, TransportError>
where
	T: ?Sized + HttpTransport,
{
	tokio::time::timeout(timeout, transport.send(request, timeout))
		.await
		.unwrap_or(Err(TransportError::TimedOut))
}

pub(crate) fn success(status: u16) -> bool {
	(200..300).contains(&status)
}

pub(crate) fn json_body<D>(body: &[u8]) -> Result<D, serde_path_to_error::Error<serde_json::Error>>
where
	D: for<'de> Deserialize<'de>,
{
	let de = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(de)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, auth::ClientSecret, error::SecretFetchError};

	const RENEW_URL: &str = "https://auth.example.com/renew";
	const SECRET_URL: &str = "https://auth.example.com/secret";

	struct FixedSecret;
	impl SecretProvider for FixedSecret {
		fn fetch_secret(&self) -> SecretFuture<'_> {
			Box::pin(async { ClientSecret::new("key-1").map_err(Into::into) })
		}
	}

	fn renewer(
		transport: Arc<ScriptedTransport>,
		timeout: StdDuration,
	) -> HttpTokenRenewer<ScriptedTransport> {
		HttpTokenRenewer::new(
			transport,
			Arc::new(FixedSecret),
			Url::parse(RENEW_URL).expect("Renewal URL should parse."),
			timeout,
		)
	}

	#[tokio::test(start_paused = true)]
	async fn slow_renewal_replies_time_out() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.enqueue(
			RENEW_URL,
			ScriptedReply::status(200, "{\"hashToken\":\"T2\"}")
				.with_delay(StdDuration::from_secs(60)),
		);

		let started = tokio::time::Instant::now();
		let err = renewer(transport, StdDuration::from_secs(2))
			.renew(Some(&AccessToken::new("T1")))
			.await
			.expect_err("A reply slower than the renewal timeout should fail.");

		assert!(matches!(err, RenewalError::Transport(TransportError::TimedOut)));
		assert!(started.elapsed() < StdDuration::from_secs(60));
	}

	#[tokio::test(start_paused = true)]
	async fn slow_secret_replies_time_out() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.enqueue(
			SECRET_URL,
			ScriptedReply::status(200, "{\"clientKey\":\"key-1\"}")
				.with_delay(StdDuration::from_secs(60)),
		);

		let provider = HttpSecretProvider::new(
			transport.clone(),
			Url::parse(SECRET_URL).expect("Secret URL should parse."),
			StdDuration::from_secs(2),
		);
		let err = provider.fetch_secret().await.expect_err("A slow secret reply should fail.");

		assert!(matches!(err, SecretFetchError::Transport(TransportError::TimedOut)));
	}

	#[tokio::test]
	async fn timely_renewal_replies_are_accepted() {
		let transport = Arc::new(ScriptedTransport::default());

		transport.enqueue(RENEW_URL, ScriptedReply::status(200, "{\"hashToken\":\"T2\"}"));

		let token = renewer(transport.clone(), StdDuration::from_secs(2))
			.renew(Some(&AccessToken::new("T1")))
			.await
			.expect("Renewal should succeed.");

		assert_eq!(token, AccessToken::new("T2"));

		let sent = transport.requests_to(RENEW_URL);

		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].headers.get("client_key").and_then(|v| v.to_str().ok()), Some("key-1"));
	}

	#[test]
	fn renew_request_serializes_null_when_no_token_is_stored() {
		let payload = serde_json::to_string(&RenewRequest { hash_token: None })
			.expect("Renew request should serialize.");

		assert_eq!(payload, "{\"hashToken\":null}");

		let payload = serde_json::to_string(&RenewRequest { hash_token: Some("T1") })
			.expect("Renew request should serialize.");

		assert_eq!(payload, "{\"hashToken\":\"T1\"}");
	}

	#[test]
	fn json_body_reports_the_failing_path() {
		let err = json_body::<RenewResponse>(b"{\"hashToken\":42}")
			.expect_err("Numeric tokens should be rejected.");

		assert_eq!(err.path().to_string(), "hashToken");
	}

	#[test]
	fn only_2xx_counts_as_success() {
		assert!(success(200));
		assert!(success(204));
		assert!(!success(301));
		assert!(!success(401));
		assert!(!success(500));
	}
}
