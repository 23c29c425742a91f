//! Demonstrates the reqwest-backed pipeline recovering from an expired token against a mock API.
//!
//! The mock server rejects the stale token with `401`; the pipeline fetches the client key,
//! renews the token once for both concurrent requests, and replays them with the new token.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use token_interceptor::{
	config::{PipelineConfig, RenewalEndpoints},
	http::ReqwestTransport,
	oauth2::http::Request,
	pipeline::ReqwestPipeline,
	reqwest,
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let _secret = server
		.mock_async(|when, then| {
			when.method(GET).path("/secret");
			then.status(200).json_body(json!({ "clientKey": "demo-key" }));
		})
		.await;
	let renew = server
		.mock_async(|when, then| {
			when.method(POST).path("/renew").header("client_key", "demo-key");
			then.status(200)
				.delay(Duration::from_millis(100))
				.json_body(json!({ "hashToken": "fresh" }));
		})
		.await;
	let _expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile").header("authorization", "Bearer stale");
			then.status(401);
		})
		.await;
	let _accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/profile").header("authorization", "Bearer fresh");
			then.status(200).json_body(json!({ "name": "demo" }));
		})
		.await;
	let store = Arc::new(MemoryStore::with_value("hashToken", "stale"));
	let endpoints = RenewalEndpoints::new(
		Url::parse(&server.url("/renew"))?,
		Url::parse(&server.url("/secret"))?,
	)?;
	let config = PipelineConfig::builder()
		.default_timeout(Duration::from_secs(10))
		.renewal_timeout(Duration::from_secs(5))
		.build()?;
	// httpmock serves a self-signed certificate.
	let transport = ReqwestTransport::with_client(
		reqwest::Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()?,
	);
	let pipeline = ReqwestPipeline::with_endpoints(
		Arc::new(transport),
		store.clone(),
		&endpoints,
		config,
	);
	let request = || Request::get(server.url("/profile")).body(Vec::new());
	let (first, second) = tokio::join!(pipeline.handle(request()?), pipeline.handle(request()?));

	println!("First response: {}.", String::from_utf8_lossy(first?.body()));
	println!("Second response: {}.", String::from_utf8_lossy(second?.body()));
	println!("Renewal calls: {}.", renew.hits_async().await);
	println!("Stored token: {:?}.", store.snapshot("hashToken"));
	println!("Coordinator: {:?}.", pipeline.coordinator());

	Ok(())
}
