//! Demonstrates plugging an in-process [`HttpTransport`] and a custom [`TokenRenewer`] into the
//! pipeline.
//!
//! 1. Implement [`HttpTransport`] so every HTTP status comes back as `Ok` and only
//!    connection-level failures become a [`TransportError`].
//! 2. Implement [`TokenRenewer`] for the backend-specific exchange.
//! 3. Wrap both in `Arc` and pass them to [`AuthPipeline::new`].
//! 4. React to [`Error::is_session_invalid`] by ending the session.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use color_eyre::Result;
// self
use token_interceptor::{
	auth::AccessToken,
	config::PipelineConfig,
	error::{Error, RenewalError, TransportError},
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture, bearer_of},
	oauth2::http::{Request, StatusCode},
	pipeline::AuthPipeline,
	renewal::{RenewFuture, TokenRenewer},
	store::MemoryStore,
};

/// Accepts only the token it currently considers valid.
struct InProcessApi {
	valid: parking_lot::RwLock<String>,
}
impl HttpTransport for InProcessApi {
	fn send(&self, request: HttpRequest, _timeout: Duration) -> TransportFuture<'_> {
		Box::pin(async move {
			if request.uri().host() == Some("unreachable.invalid") {
				return Err(TransportError::Offline);
			}

			let authorized =
				bearer_of(&request).is_some_and(|token| token.expose() == *self.valid.read());
			let mut response = HttpResponse::new(if authorized {
				b"{\"ok\":true}".to_vec()
			} else {
				b"{}".to_vec()
			});

			if !authorized {
				*response.status_mut() = StatusCode::UNAUTHORIZED;
			}

			Ok(response)
		})
	}
}

/// Issues sequential tokens, failing once the budget is spent.
struct CountingRenewer {
	issued: AtomicUsize,
	budget: usize,
	api: Arc<InProcessApi>,
}
impl TokenRenewer for CountingRenewer {
	fn renew<'a>(&'a self, _current: Option<&'a AccessToken>) -> RenewFuture<'a> {
		Box::pin(async move {
			tokio::time::sleep(Duration::from_millis(50)).await;

			let issued = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

			if issued > self.budget {
				return Err(RenewalError::Rejected { status: 403 });
			}

			let token = format!("token-{issued}");

			*self.api.valid.write() = token.clone();

			Ok(AccessToken::new(token))
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let api = Arc::new(InProcessApi { valid: parking_lot::RwLock::new("token-0".into()) });
	let renewer =
		Arc::new(CountingRenewer { issued: AtomicUsize::new(0), budget: 1, api: api.clone() });
	let store = Arc::new(MemoryStore::with_value("hashToken", "expired"));
	let pipeline = AuthPipeline::new(api.clone(), store.clone(), renewer, PipelineConfig::default());
	let request = || Request::get("https://api.example.com/me").body(Vec::new());
	let (a, b, c) = tokio::join!(
		pipeline.handle(request()?),
		pipeline.handle(request()?),
		pipeline.handle(request()?)
	);

	for response in [a?, b?, c?] {
		println!("Replayed response: {}.", String::from_utf8_lossy(response.body()));
	}

	println!(
		"Renewals after three concurrent 401s: {}.",
		pipeline.coordinator().metrics().renewals()
	);

	// The server revokes the token; the next renewal is refused and the session ends.
	*api.valid.write() = "revoked".into();

	match pipeline.handle(request()?).await {
		Err(e) if e.is_session_invalid() => println!("Session ended: {e}."),
		Err(e) => return Err(e.into()),
		Ok(_) => println!("Unexpected success after revocation."),
	}

	match pipeline.handle(Request::get("https://unreachable.invalid/").body(Vec::new())?).await {
		Err(Error::Transport(e)) => println!("Transport failure surfaced untouched: {e}."),
		other => println!("Unexpected outcome: {other:?}."),
	}

	println!("Stored token: {:?}.", store.snapshot("hashToken"));

	Ok(())
}
