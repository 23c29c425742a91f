//! Redacted access token wrapper with a log-safe fingerprint.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	oauth2::http::{HeaderValue, header::InvalidHeaderValue},
};

const FINGERPRINT_LEN: usize = 12;
const BEARER_SCHEME: &str = "bearer";

/// Opaque bearer token attached to outgoing requests.
///
/// The value is never printed by [`Debug`] or [`Display`]. Use [`fingerprint`](Self::fingerprint)
/// when a token needs to be correlated in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);
impl AccessToken {
	/// Wraps a token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Parses an `Authorization` header value (`Bearer <token>`).
	///
	/// Values without a scheme are taken as the raw token. Returns `None` for blank values,
	/// including a bare `Bearer` scheme.
	pub fn from_authorization(value: &str) -> Option<Self> {
		let value = value.trim();
		let token = match value.split_once(' ') {
			Some((scheme, rest)) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => rest.trim(),
			Some(_) => return None,
			None if value.eq_ignore_ascii_case(BEARER_SCHEME) => return None,
			None => value,
		};

		if token.is_empty() { None } else { Some(Self::new(token)) }
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Formats the token as an `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}

	/// Builds a sensitive `Authorization` header value for the token.
	pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
		let mut value = HeaderValue::from_str(&self.bearer())?;

		value.set_sensitive(true);

		Ok(value)
	}

	/// Short base64 (no padding) SHA-256 prefix identifying the token without revealing it.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.0.as_bytes());

		let mut encoded = STANDARD_NO_PAD.encode(hasher.finalize());

		encoded.truncate(FINGERPRINT_LEN);

		encoded
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl From<String> for AccessToken {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AccessToken").field(&"<redacted>").finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_formatters_redact() {
		let token = AccessToken::new("super-secret");

		assert_eq!(format!("{token:?}"), "AccessToken(\"<redacted>\")");
		assert_eq!(format!("{token}"), "<redacted>");
		assert_eq!(token.bearer(), "Bearer super-secret");
	}

	#[test]
	fn authorization_values_are_parsed() {
		assert_eq!(AccessToken::from_authorization("Bearer T2"), Some(AccessToken::new("T2")));
		assert_eq!(AccessToken::from_authorization("bearer  T3 "), Some(AccessToken::new("T3")));
		assert_eq!(AccessToken::from_authorization("T4"), Some(AccessToken::new("T4")));
		assert_eq!(AccessToken::from_authorization("Basic abc"), None);
		assert_eq!(AccessToken::from_authorization("Bearer "), None);
		assert_eq!(AccessToken::from_authorization("  BEARER"), None);
		assert_eq!(AccessToken::from_authorization(""), None);
	}

	#[test]
	fn fingerprint_is_stable_and_short() {
		let a = AccessToken::new("T1");
		let b = AccessToken::new("T1");
		let c = AccessToken::new("T2");

		assert_eq!(a.fingerprint(), b.fingerprint());
		assert_ne!(a.fingerprint(), c.fingerprint());
		assert_eq!(a.fingerprint().len(), FINGERPRINT_LEN);
		assert!(!a.fingerprint().contains("T1"));
	}
}
