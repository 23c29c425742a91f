//! Pipeline configuration: timeouts, exempt URLs, token slot, and renewal endpoints.
//!
//! Everything is supplied at construction time through [`PipelineConfig::builder`] or
//! deserialized from JSON; nothing is hardcoded in the pipeline itself.

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// Default store slot holding the access token.
pub const DEFAULT_TOKEN_KEY: &str = "hashToken";
/// Default request timeout.
pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);
/// Default timeout applied to the secret + renewal calls.
pub const DEFAULT_RENEWAL_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Errors raised while constructing or validating a [`PipelineConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum PipelineConfigError {
	/// Timeouts must be positive.
	#[error("The {which} timeout must be greater than zero.")]
	ZeroTimeout {
		/// Which timeout failed validation.
		which: &'static str,
	},
	/// The token slot key must not be blank.
	#[error("Token store key must not be empty.")]
	EmptyTokenKey,
	/// Exempt patterns must not be blank.
	#[error("Exempt URL patterns must not be empty.")]
	EmptyExemptPattern,
	/// Renewal endpoints must be http(s) URLs.
	#[error("The {endpoint} endpoint must use http or https: {url}.")]
	UnsupportedEndpointScheme {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// URL pattern whose requests bypass token attachment.
///
/// Patterns ending in `*` match by prefix; anything else must match exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExemptRule {
	/// Whole-URL match.
	Exact(String),
	/// Prefix match (pattern without the trailing `*`).
	Prefix(String),
}
impl ExemptRule {
	/// Checks whether `url` is covered by the rule.
	pub fn matches(&self, url: &str) -> bool {
		match self {
			Self::Exact(exact) => url == exact,
			Self::Prefix(prefix) => url.starts_with(prefix.as_str()),
		}
	}
}
impl FromStr for ExemptRule {
	type Err = PipelineConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let pattern = s.trim();

		match pattern.strip_suffix('*') {
			Some(prefix) if !prefix.is_empty() => Ok(Self::Prefix(prefix.to_owned())),
			Some(_) => Err(PipelineConfigError::EmptyExemptPattern),
			None if pattern.is_empty() => Err(PipelineConfigError::EmptyExemptPattern),
			None => Ok(Self::Exact(pattern.to_owned())),
		}
	}
}
impl TryFrom<String> for ExemptRule {
	type Error = PipelineConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}
impl From<ExemptRule> for String {
	fn from(value: ExemptRule) -> Self {
		match value {
			ExemptRule::Exact(exact) => exact,
			ExemptRule::Prefix(prefix) => format!("{prefix}*"),
		}
	}
}

/// Validated pipeline settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPipelineConfig", into = "RawPipelineConfig")]
pub struct PipelineConfig {
	/// Timeout applied when a request carries no hint.
	pub default_timeout: StdDuration,
	/// Timeout applied to the secret and renewal calls.
	pub renewal_timeout: StdDuration,
	/// Requests matching any of these rules never carry a token.
	pub exempt_urls: Vec<ExemptRule>,
	/// Store slot holding the access token.
	pub token_key: String,
}
impl PipelineConfig {
	/// Creates a builder seeded with defaults.
	pub fn builder() -> PipelineConfigBuilder {
		PipelineConfigBuilder::default()
	}

	/// Parses and validates a JSON document.
	pub fn from_json(raw: &str) -> Result<Self> {
		let de = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(de)
			.map_err(|source| crate::error::ConfigError::Parse { source }.into())
	}

	/// Returns true when `url` must not carry a token.
	pub fn is_exempt(&self, url: &str) -> bool {
		self.exempt_urls.iter().any(|rule| rule.matches(url))
	}

	fn validate(&self) -> Result<(), PipelineConfigError> {
		if self.default_timeout.is_zero() {
			return Err(PipelineConfigError::ZeroTimeout { which: "default" });
		}
		if self.renewal_timeout.is_zero() {
			return Err(PipelineConfigError::ZeroTimeout { which: "renewal" });
		}
		if self.token_key.trim().is_empty() {
			return Err(PipelineConfigError::EmptyTokenKey);
		}

		Ok(())
	}
}
impl Default for PipelineConfig {
	fn default() -> Self {
		Self {
			default_timeout: DEFAULT_TIMEOUT,
			renewal_timeout: DEFAULT_RENEWAL_TIMEOUT,
			exempt_urls: Vec::new(),
			token_key: DEFAULT_TOKEN_KEY.into(),
		}
	}
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
struct RawPipelineConfig {
	default_timeout_ms: u64,
	renewal_timeout_ms: u64,
	exempt_urls: Vec<String>,
	token_key: String,
}
impl Default for RawPipelineConfig {
	fn default() -> Self {
		PipelineConfig::default().into()
	}
}
impl TryFrom<RawPipelineConfig> for PipelineConfig {
	type Error = PipelineConfigError;

	fn try_from(raw: RawPipelineConfig) -> Result<Self, Self::Error> {
		let mut builder = PipelineConfig::builder()
			.default_timeout(StdDuration::from_millis(raw.default_timeout_ms))
			.renewal_timeout(StdDuration::from_millis(raw.renewal_timeout_ms))
			.token_key(raw.token_key);

		for pattern in &raw.exempt_urls {
			builder = builder.exempt(pattern);
		}

		builder.build()
	}
}
impl From<PipelineConfig> for RawPipelineConfig {
	fn from(config: PipelineConfig) -> Self {
		Self {
			default_timeout_ms: u64::try_from(config.default_timeout.as_millis())
				.unwrap_or(u64::MAX),
			renewal_timeout_ms: u64::try_from(config.renewal_timeout.as_millis())
				.unwrap_or(u64::MAX),
			exempt_urls: config.exempt_urls.into_iter().map(String::from).collect(),
			token_key: config.token_key,
		}
	}
}

/// Builder for [`PipelineConfig`] values.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
	config: PipelineConfig,
	patterns: Vec<String>,
}
impl PipelineConfigBuilder {
	/// Overrides the default request timeout.
	pub fn default_timeout(mut self, timeout: StdDuration) -> Self {
		self.config.default_timeout = timeout;

		self
	}

	/// Overrides the timeout applied to secret + renewal calls.
	pub fn renewal_timeout(mut self, timeout: StdDuration) -> Self {
		self.config.renewal_timeout = timeout;

		self
	}

	/// Overrides the store slot holding the token.
	pub fn token_key(mut self, key: impl Into<String>) -> Self {
		self.config.token_key = key.into();

		self
	}

	/// Adds an exempt URL pattern (exact, or prefix when ending in `*`).
	pub fn exempt(mut self, pattern: impl Into<String>) -> Self {
		self.patterns.push(pattern.into());

		self
	}

	/// Adds several exempt URL patterns.
	pub fn exempt_all<I, S>(mut self, patterns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.patterns.extend(patterns.into_iter().map(Into::into));

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<PipelineConfig, PipelineConfigError> {
		let mut config = self.config;

		for pattern in self.patterns {
			let rule = pattern.parse::<ExemptRule>()?;

			if !config.exempt_urls.contains(&rule) {
				config.exempt_urls.push(rule);
			}
		}

		config.validate()?;

		Ok(config)
	}
}

/// Endpoints used to renew the access token.
///
/// Deserialization goes through [`RenewalEndpoints::new`], so non-http(s) endpoints are rejected
/// there too.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRenewalEndpoints")]
pub struct RenewalEndpoints {
	/// Endpoint that trades the current token for a new one (POST).
	pub renewal: Url,
	/// Endpoint that hands out the client key authorizing renewals (GET).
	pub secret: Url,
}
impl RenewalEndpoints {
	/// Validates and wraps the renewal + secret endpoints.
	pub fn new(renewal: Url, secret: Url) -> Result<Self, PipelineConfigError> {
		validate_endpoint("renewal", &renewal)?;
		validate_endpoint("secret", &secret)?;

		Ok(Self { renewal, secret })
	}

	/// Exact exempt rules covering both endpoints.
	pub fn exempt_rules(&self) -> [ExemptRule; 2] {
		[ExemptRule::Exact(self.renewal.to_string()), ExemptRule::Exact(self.secret.to_string())]
	}
}

#[derive(Deserialize)]
struct RawRenewalEndpoints {
	renewal: Url,
	secret: Url,
}
impl TryFrom<RawRenewalEndpoints> for RenewalEndpoints {
	type Error = PipelineConfigError;

	fn try_from(raw: RawRenewalEndpoints) -> Result<Self, Self::Error> {
		Self::new(raw.renewal, raw.secret)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), PipelineConfigError> {
	if matches!(url.scheme(), "http" | "https") {
		Ok(())
	} else {
		Err(PipelineConfigError::UnsupportedEndpointScheme { endpoint: name, url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn builder_applies_overrides_and_dedupes_rules() {
		let config = PipelineConfig::builder()
			.default_timeout(StdDuration::from_millis(500))
			.token_key("session")
			.exempt("https://api.example.com/renew")
			.exempt_all(["https://api.example.com/public/*", "https://api.example.com/renew"])
			.build()
			.expect("Builder should accept valid settings.");

		assert_eq!(config.default_timeout, StdDuration::from_millis(500));
		assert_eq!(config.renewal_timeout, DEFAULT_RENEWAL_TIMEOUT);
		assert_eq!(config.token_key, "session");
		assert_eq!(config.exempt_urls.len(), 2);
		assert!(config.is_exempt("https://api.example.com/renew"));
		assert!(config.is_exempt("https://api.example.com/public/status"));
		assert!(!config.is_exempt("https://api.example.com/renew?x=1"));
		assert!(!config.is_exempt("https://api.example.com/users"));
	}

	#[test]
	fn builder_rejects_invalid_settings() {
		assert_eq!(
			PipelineConfig::builder().default_timeout(StdDuration::ZERO).build(),
			Err(PipelineConfigError::ZeroTimeout { which: "default" })
		);
		assert_eq!(
			PipelineConfig::builder().token_key("  ").build(),
			Err(PipelineConfigError::EmptyTokenKey)
		);
		assert_eq!(
			PipelineConfig::builder().exempt("*").build(),
			Err(PipelineConfigError::EmptyExemptPattern)
		);
	}

	#[test]
	fn json_config_is_parsed_with_defaults() {
		let config = PipelineConfig::from_json(
			r#"{"default_timeout_ms":1200,"exempt_urls":["https://auth.example.com/*"]}"#,
		)
		.expect("JSON config should parse.");

		assert_eq!(config.default_timeout, StdDuration::from_millis(1200));
		assert_eq!(config.token_key, DEFAULT_TOKEN_KEY);
		assert_eq!(
			config.exempt_urls,
			vec![ExemptRule::Prefix("https://auth.example.com/".into())]
		);

		let err = PipelineConfig::from_json(r#"{"default_timeout_ms":0}"#)
			.expect_err("Zero timeouts should be rejected.");

		assert!(matches!(err, Error::Config(_)));
	}

	#[test]
	fn endpoints_must_be_http() {
		let ok = RenewalEndpoints::new(
			Url::parse("https://auth.example.com/renew").expect("Valid URL."),
			Url::parse("http://auth.example.com/secret").expect("Valid URL."),
		)
		.expect("http(s) endpoints should be accepted.");

		assert!(ok.exempt_rules()[0].matches("https://auth.example.com/renew"));

		let err = RenewalEndpoints::new(
			Url::parse("ftp://auth.example.com/renew").expect("Valid URL."),
			Url::parse("https://auth.example.com/secret").expect("Valid URL."),
		)
		.expect_err("Non-http endpoints should be rejected.");

		assert!(matches!(
			err,
			PipelineConfigError::UnsupportedEndpointScheme { endpoint: "renewal", .. }
		));
	}

	#[test]
	fn deserialized_endpoints_are_validated() {
		let endpoints: RenewalEndpoints = serde_json::from_str(
			r#"{"renewal":"https://auth.example.com/renew","secret":"https://auth.example.com/secret"}"#,
		)
		.expect("http(s) endpoints should deserialize.");

		assert_eq!(endpoints.renewal.as_str(), "https://auth.example.com/renew");

		let err = serde_json::from_str::<RenewalEndpoints>(
			r#"{"renewal":"ftp://auth.example.com/renew","secret":"https://auth.example.com/secret"}"#,
		)
		.expect_err("Non-http endpoints should be rejected while deserializing.");

		assert!(err.to_string().contains("renewal"));
	}
}
