//! Bearer-token request interceptor: attaches access tokens, enforces per-request timeouts, and
//! recovers from expired sessions with one shared renewal that every blocked request replays on.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod obs;
pub mod pipeline;
pub mod renewal;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{collections::VecDeque, time::Duration as StdDuration};
	// self
	use crate::{
		error::TransportError,
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
		oauth2::http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
	};

	/// Canned reply served by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub enum ScriptedReply {
		/// Responds with the given status and JSON body after the optional delay.
		Respond {
			/// HTTP status code to return.
			status: u16,
			/// Response body.
			body: String,
			/// Extra response headers.
			headers: Vec<(&'static str, String)>,
			/// Simulated server latency.
			delay: StdDuration,
		},
		/// Fails at the connection level.
		ConnectionRefused,
	}
	impl ScriptedReply {
		/// Immediate response with the given status and body.
		pub fn status(status: u16, body: impl Into<String>) -> Self {
			Self::Respond { status, body: body.into(), headers: Vec::new(), delay: StdDuration::ZERO }
		}

		/// Adds a response header.
		pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
			if let Self::Respond { headers, .. } = &mut self {
				headers.push((name, value.into()));
			}

			self
		}

		/// Delays the response by `delay`.
		pub fn with_delay(mut self, latency: StdDuration) -> Self {
			if let Self::Respond { delay, .. } = &mut self {
				*delay = latency;
			}

			self
		}
	}

	/// Request observed by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// Request method.
		pub method: String,
		/// Request URL.
		pub url: String,
		/// `Authorization` header value, if any.
		pub authorization: Option<String>,
		/// All request headers.
		pub headers: HeaderMap,
		/// Request body.
		pub body: Vec<u8>,
	}

	type Route = Box<dyn Fn(&RecordedRequest) -> Option<ScriptedReply> + Send + Sync>;

	/// In-process transport that answers from per-URL routes and records every request.
	///
	/// Routes are evaluated in registration order; queued one-shot replies for a URL win over
	/// routes. Unmatched requests are answered with `404`.
	#[derive(Default)]
	pub struct ScriptedTransport {
		routes: Mutex<Vec<(String, Route)>>,
		queued: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
		requests: Mutex<Vec<RecordedRequest>>,
	}
	impl ScriptedTransport {
		/// Registers a route evaluated for every request sent to `url`.
		pub fn route<F>(&self, url: &str, f: F) -> &Self
		where
			F: 'static + Fn(&RecordedRequest) -> Option<ScriptedReply> + Send + Sync,
		{
			self.routes.lock().push((url.to_owned(), Box::new(f)));

			self
		}

		/// Queues a one-shot reply for `url`.
		pub fn enqueue(&self, url: &str, reply: ScriptedReply) -> &Self {
			self.queued.lock().entry(url.to_owned()).or_default().push_back(reply);

			self
		}

		/// Returns every request observed so far.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.requests.lock().clone()
		}

		/// Returns the requests observed for `url`.
		pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
			self.requests.lock().iter().filter(|r| r.url == url).cloned().collect()
		}

		fn reply_for(&self, recorded: &RecordedRequest) -> ScriptedReply {
			if let Some(reply) =
				self.queued.lock().get_mut(&recorded.url).and_then(VecDeque::pop_front)
			{
				return reply;
			}

			self.routes
				.lock()
				.iter()
				.filter(|(url, _)| *url == recorded.url)
				.find_map(|(_, route)| route(recorded))
				.unwrap_or_else(|| ScriptedReply::status(404, "{}"))
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send(&self, request: HttpRequest, _timeout: StdDuration) -> TransportFuture<'_> {
			Box::pin(async move {
				let recorded = RecordedRequest {
					method: request.method().to_string(),
					url: request.uri().to_string(),
					authorization: request
						.headers()
						.get(AUTHORIZATION)
						.and_then(|value| value.to_str().ok())
						.map(str::to_owned),
					headers: request.headers().clone(),
					body: request.body().clone(),
				};

				self.requests.lock().push(recorded.clone());

				match self.reply_for(&recorded) {
					ScriptedReply::Respond { status, body, headers, delay } => {
						if !delay.is_zero() {
							tokio::time::sleep(delay).await;
						} else {
							tokio::task::yield_now().await;
						}

						let mut response = HttpResponse::new(body.into_bytes());

						*response.status_mut() =
							StatusCode::from_u16(status).map_err(TransportError::network)?;

						for (name, value) in headers {
							let value =
								value.parse::<HeaderValue>().map_err(TransportError::network)?;

							response.headers_mut().insert(name, value);
						}

						Ok(response)
					},
					ScriptedReply::ConnectionRefused => Err(TransportError::Io(
						std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
					)),
				}
			})
		}
	}

	/// [`TokenStore`](crate::store::TokenStore) wrapper that counts writes to a [`MemoryStore`].
	///
	/// [`MemoryStore`]: crate::store::MemoryStore
	#[derive(Debug, Default)]
	pub struct CountingStore {
		inner: crate::store::MemoryStore,
		writes: Mutex<Vec<(String, String)>>,
	}
	impl CountingStore {
		/// Wraps a store pre-populated with `value` under `key`.
		pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
			Self { inner: crate::store::MemoryStore::with_value(key, value), ..Default::default() }
		}

		/// Number of `set` calls observed so far.
		pub fn sets(&self) -> usize {
			self.writes.lock().len()
		}

		/// Every `(key, value)` pair written, in order.
		pub fn writes(&self) -> Vec<(String, String)> {
			self.writes.lock().clone()
		}

		/// Returns the value currently stored under `key`.
		pub fn snapshot(&self, key: &str) -> Option<String> {
			self.inner.snapshot(key)
		}
	}
	impl crate::store::TokenStore for CountingStore {
		fn get<'a>(&'a self, key: &'a str) -> crate::store::StoreFuture<'a, Option<String>> {
			self.inner.get(key)
		}

		fn set<'a>(&'a self, key: &'a str, value: String) -> crate::store::StoreFuture<'a, ()> {
			self.writes.lock().push((key.to_owned(), value.clone()));

			self.inner.set(key, value)
		}
	}

	/// Builds a reqwest transport that accepts the self-signed certificates produced by `httpmock`
	/// during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_transport() -> crate::http::ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestTransport::with_client(client)
	}

	/// Builds a reqwest-backed pipeline renewing against `endpoints` and persisting into `store`.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_pipeline(
		endpoints: &crate::config::RenewalEndpoints,
		store: Arc<crate::store::MemoryStore>,
	) -> crate::pipeline::ReqwestPipeline {
		let config = crate::config::PipelineConfig::builder()
			.default_timeout(StdDuration::from_secs(5))
			.renewal_timeout(StdDuration::from_secs(5))
			.build()
			.expect("Test pipeline config should be valid.");

		crate::pipeline::AuthPipeline::with_endpoints(
			Arc::new(test_reqwest_transport()),
			store,
			endpoints,
			config,
		)
	}

	/// Builds a request for `url` with an empty body.
	pub fn get_request(url: &str) -> HttpRequest {
		let mut request = HttpRequest::new(Vec::new());

		*request.uri_mut() = url.parse().expect("Test URL should parse as a URI.");

		request
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
