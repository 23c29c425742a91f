//! Short-lived client secret that authorizes a single renewal call.

// self
use crate::{
	_prelude::*,
	oauth2::http::{HeaderMap, HeaderName, HeaderValue},
};

/// Header carrying the client key on renewal requests.
pub const CLIENT_KEY_HEADER: &str = "CLIENT_KEY";

/// Client key fetched from the secret endpoint, already shaped as a request header.
///
/// Secrets are fetched per renewal attempt and never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret {
	name: HeaderName,
	value: HeaderValue,
}
impl ClientSecret {
	/// Wraps a client key into the [`CLIENT_KEY_HEADER`] header.
	pub fn new(client_key: &str) -> Result<Self, crate::oauth2::http::header::InvalidHeaderValue> {
		let mut value = HeaderValue::from_str(client_key)?;

		value.set_sensitive(true);

		Ok(Self { name: HeaderName::from_static("client_key"), value })
	}

	/// Returns the inner key. Callers must avoid logging this string.
	pub fn expose(&self) -> &[u8] {
		self.value.as_bytes()
	}

	/// Inserts the secret header into `headers`, replacing any previous value.
	pub fn apply(&self, headers: &mut HeaderMap) {
		headers.insert(self.name.clone(), self.value.clone());
	}
}
impl Debug for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientSecret")
			.field("header", &self.name.as_str())
			.field("value", &"<redacted>")
			.finish()
	}
}
impl Display for ClientSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
