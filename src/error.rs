//! Interceptor-level error types shared across the pipeline, coordinator, renewal client, and
//! stores.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, http::HttpResponse, oauth2::http::header::InvalidHeaderValue};

/// Interceptor-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type JsonPathError = serde_path_to_error::Error<serde_json::Error>;

/// Canonical error surfaced to callers of the pipeline.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Connection-level failure (DNS, TCP, TLS, offline); never retried.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token renewal failed; the session should be treated as ended.
	#[error("Session is no longer valid: {0}")]
	Session(#[source] Arc<RenewalError>),

	/// Transport did not answer within the request deadline.
	#[error("Request to {url} timed out after {timeout:?}.")]
	Timeout {
		/// Target URL of the timed out request.
		url: String,
		/// Deadline that elapsed.
		timeout: StdDuration,
	},
	/// Server rejected the credentials and the rejection could not be recovered.
	#[error("Request was rejected as unauthenticated ({}).", .response.status())]
	AuthExpired {
		/// Untouched `401` response.
		response: Box<HttpResponse>,
	},
	/// Server rejected the request as malformed (`400`).
	#[error("Request was rejected as malformed ({}).", .response.status())]
	ClientError {
		/// Untouched `400` response.
		response: Box<HttpResponse>,
	},
	/// Server failed to process the request (`5xx`).
	#[error("Server failed to process the request ({}).", .response.status())]
	ServerError {
		/// Untouched `5xx` response.
		response: Box<HttpResponse>,
	},
	/// Any other non-success status.
	#[error("Request failed with status {}.", .response.status())]
	UnexpectedStatus {
		/// Untouched response.
		response: Box<HttpResponse>,
	},
}
impl Error {
	/// Returns true when the caller should end the session (force logout).
	///
	/// An abandoned renewal says nothing about the session and does not count.
	pub fn is_session_invalid(&self) -> bool {
		matches!(self, Self::Session(e) if !matches!(**e, RenewalError::Abandoned))
	}

	/// Returns the HTTP response carried by status-classified errors.
	pub fn response(&self) -> Option<&HttpResponse> {
		match self {
			Self::AuthExpired { response }
			| Self::ClientError { response }
			| Self::ServerError { response }
			| Self::UnexpectedStatus { response } => Some(response.as_ref()),
			_ => None,
		}
	}

	/// Returns the HTTP status code carried by status-classified errors.
	pub fn status(&self) -> Option<u16> {
		self.response().map(|response| response.status().as_u16())
	}
}
impl From<RenewalError> for Error {
	fn from(e: RenewalError) -> Self {
		Self::Session(Arc::new(e))
	}
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] crate::oauth2::http::Error),
	/// Pipeline configuration failed validation.
	#[error(transparent)]
	Pipeline(#[from] crate::config::PipelineConfigError),
	/// Access token cannot be carried in an `Authorization` header.
	#[error("Access token is not a valid header value.")]
	InvalidToken(#[source] InvalidHeaderValue),
	/// Pipeline configuration document could not be parsed.
	#[error("Pipeline configuration is malformed.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: JsonPathError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO). HTTP statuses are never transport failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
	/// The transport enforced its own deadline.
	#[error("Transport gave up waiting for a response.")]
	TimedOut,
	/// The network status observer reported the host offline.
	#[error("Network is offline.")]
	Offline,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::TimedOut } else { Self::network(e) }
	}
}

/// Failures raised while renewing the access token.
#[derive(Debug, ThisError)]
pub enum RenewalError {
	/// Client secret needed to authorize the renewal could not be fetched.
	#[error(transparent)]
	Secret(#[from] SecretFetchError),
	/// Renewal endpoint could not be reached.
	#[error("Renewal endpoint could not be reached.")]
	Transport(#[from] TransportError),
	/// Renewal request could not be built.
	#[error("Renewal request could not be built.")]
	Request(#[from] crate::oauth2::http::Error),
	/// Renewal payload could not be encoded.
	#[error("Renewal payload could not be encoded.")]
	Encode(#[from] serde_json::Error),
	/// Renewal endpoint answered with a non-success status.
	#[error("Renewal endpoint rejected the request with status {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// Renewal endpoint answered with malformed JSON.
	#[error("Renewal endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: JsonPathError,
		/// HTTP status code.
		status: u16,
	},
	/// Renewal endpoint answered without a usable token.
	#[error("Renewal endpoint response did not contain a token.")]
	MissingToken,
	/// Token store failed while the renewal read or persisted the token.
	#[error("Token store failed during renewal.")]
	Store(#[from] crate::store::StoreError),
	/// The renewal cycle ended without publishing an outcome.
	#[error("Token renewal was abandoned before completing.")]
	Abandoned,
}

/// Failures raised while fetching the client secret used by renewals.
#[derive(Debug, ThisError)]
pub enum SecretFetchError {
	/// Secret endpoint could not be reached.
	#[error("Secret endpoint could not be reached.")]
	Transport(#[from] TransportError),
	/// Secret request could not be built.
	#[error("Secret request could not be built.")]
	Request(#[from] crate::oauth2::http::Error),
	/// Secret endpoint answered with a non-success status.
	#[error("Secret endpoint rejected the request with status {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// Secret endpoint answered with malformed JSON.
	#[error("Secret endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: JsonPathError,
		/// HTTP status code.
		status: u16,
	},
	/// Client key cannot be carried in a header.
	#[error("Client key is not a valid header value.")]
	InvalidHeader(#[from] InvalidHeaderValue),
}
