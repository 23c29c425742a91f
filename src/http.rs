//! Transport primitives used by the pipeline and the renewal client.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. Requests and responses are
//! the `http` crate types re-exported through `oauth2` ([`HttpRequest`] / [`HttpResponse`]).
//! Implementations return every HTTP status as `Ok`; only connection-level failures become a
//! [`TransportError`]. Status classification belongs to the pipeline.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::{ConfigError, TransportError},
	oauth2::http::header::AUTHORIZATION,
};

pub use oauth2::{HttpRequest, HttpResponse};

/// Header carrying a per-request timeout in milliseconds.
pub const TIMEOUT_HEADER: &str = "timeout";

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports that perform the actual network call.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// pipeline, the renewal client, and the secret provider behind `Arc`.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request`, giving up after `timeout`.
	fn send(&self, request: HttpRequest, timeout: StdDuration) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: HttpRequest, timeout: StdDuration) -> TransportFuture<'_> {
		(**self).send(request, timeout)
	}
}

/// Per-request timeout override carried in the request extensions.
///
/// Takes precedence over the [`TIMEOUT_HEADER`] header and the configured default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTimeout(pub StdDuration);

/// Resolves the timeout hint attached to `request`, if any.
pub fn timeout_hint(request: &HttpRequest) -> Option<StdDuration> {
	if let Some(RequestTimeout(timeout)) = request.extensions().get::<RequestTimeout>() {
		return Some(*timeout);
	}

	request
		.headers()
		.get(TIMEOUT_HEADER)
		.and_then(|value| value.to_str().ok())
		.and_then(|raw| raw.trim().parse::<u64>().ok())
		.filter(|ms| *ms > 0)
		.map(StdDuration::from_millis)
}

/// Sets `Authorization: Bearer <token>` on `request`, replacing any previous value.
pub fn attach_bearer(request: &mut HttpRequest, token: &AccessToken) -> Result<(), ConfigError> {
	let value = token.header_value().map_err(ConfigError::InvalidToken)?;

	request.headers_mut().insert(AUTHORIZATION, value);

	Ok(())
}

/// Reads the bearer token carried by `request`, if any.
pub fn bearer_of(request: &HttpRequest) -> Option<AccessToken> {
	request
		.headers()
		.get(AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(AccessToken::from_authorization)
}

/// Reqwest-backed [`HttpTransport`].
///
/// Redirects are followed according to the wrapped client's policy; configure a custom
/// [`ReqwestClient`] through [`ReqwestTransport::with_client`] to change it.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest, timeout: StdDuration) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut request = reqwest::Request::try_from(request)?;

			*request.timeout_mut() = Some(timeout);

			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
