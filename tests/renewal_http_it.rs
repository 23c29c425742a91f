#![cfg(feature = "reqwest")]

// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use token_interceptor::{
	_preludet::*,
	auth::AccessToken,
	config::RenewalEndpoints,
	error::{RenewalError, SecretFetchError},
	http::ReqwestTransport,
	renewal::{HttpSecretProvider, HttpTokenRenewer, SecretProvider, TokenRenewer},
	store::MemoryStore,
};

fn endpoints(server: &MockServer) -> RenewalEndpoints {
	RenewalEndpoints::new(
		Url::parse(&server.url("/renew")).expect("Mock renewal endpoint should parse."),
		Url::parse(&server.url("/secret")).expect("Mock secret endpoint should parse."),
	)
	.expect("Mock endpoints should be valid.")
}

fn renewer(server: &MockServer) -> HttpTokenRenewer<ReqwestTransport> {
	HttpTokenRenewer::from_endpoints(
		Arc::new(test_reqwest_transport()),
		&endpoints(server),
		StdDuration::from_secs(5),
	)
}

#[tokio::test]
async fn renewal_exchanges_the_current_token() {
	let server = MockServer::start_async().await;
	let secret = server
		.mock_async(|when, then| {
			when.method(GET).path("/secret");
			then.status(200).json_body(json!({ "clientKey": "key-1" }));
		})
		.await;
	let renew = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/renew")
				.header("client_key", "key-1")
				.json_body(json!({ "hashToken": "T1" }));
			then.status(200).json_body(json!({ "hashToken": "T2" }));
		})
		.await;
	let token = renewer(&server)
		.renew(Some(&AccessToken::new("T1")))
		.await
		.expect("Renewal should succeed.");

	secret.assert_async().await;
	renew.assert_async().await;

	assert_eq!(token.expose(), "T2");
}

#[tokio::test]
async fn renewal_without_a_token_sends_null() {
	let server = MockServer::start_async().await;
	let _secret = server
		.mock_async(|when, then| {
			when.method(GET).path("/secret");
			then.status(200).json_body(json!({ "clientKey": "key-1" }));
		})
		.await;
	let renew = server
		.mock_async(|when, then| {
			when.method(POST).path("/renew").json_body(json!({ "hashToken": null }));
			then.status(200).json_body(json!({ "hashToken": "T1" }));
		})
		.await;
	let token = renewer(&server).renew(None).await.expect("Renewal should succeed.");

	renew.assert_async().await;

	assert_eq!(token.expose(), "T1");
}

#[tokio::test]
async fn renewal_rejections_and_malformed_bodies_are_errors() {
	let server = MockServer::start_async().await;
	let _secret = server
		.mock_async(|when, then| {
			when.method(GET).path("/secret");
			then.status(200).json_body(json!({ "clientKey": "key-1" }));
		})
		.await;
	let mut rejected = server
		.mock_async(|when, then| {
			when.method(POST).path("/renew");
			then.status(500).body("{}");
		})
		.await;
	let err = renewer(&server)
		.renew(Some(&AccessToken::new("T1")))
		.await
		.expect_err("A 500 should fail the renewal.");

	assert!(matches!(err, RenewalError::Rejected { status: 500 }));

	rejected.delete_async().await;

	let mut malformed = server
		.mock_async(|when, then| {
			when.method(POST).path("/renew");
			then.status(200).body("not json");
		})
		.await;
	let err = renewer(&server)
		.renew(Some(&AccessToken::new("T1")))
		.await
		.expect_err("Malformed JSON should fail the renewal.");

	assert!(matches!(err, RenewalError::Parse { status: 200, .. }));

	malformed.delete_async().await;

	let _empty = server
		.mock_async(|when, then| {
			when.method(POST).path("/renew");
			then.status(200).json_body(json!({ "hashToken": "" }));
		})
		.await;
	let err = renewer(&server)
		.renew(Some(&AccessToken::new("T1")))
		.await
		.expect_err("An empty token should fail the renewal.");

	assert!(matches!(err, RenewalError::MissingToken));
}

#[tokio::test]
async fn secret_failures_stop_the_renewal() {
	let server = MockServer::start_async().await;
	let _secret = server
		.mock_async(|when, then| {
			when.method(GET).path("/secret");
			then.status(403).body("{}");
		})
		.await;
	let renew = server
		.mock_async(|when, then| {
			when.method(POST).path("/renew");
			then.status(200).json_body(json!({ "hashToken": "T2" }));
		})
		.await;
	let err = renewer(&server)
		.renew(Some(&AccessToken::new("T1")))
		.await
		.expect_err("Secret rejection should fail the renewal.");

	assert!(matches!(err, RenewalError::Secret(SecretFetchError::Rejected { status: 403 })));
	assert_eq!(renew.hits_async().await, 0);
}

#[tokio::test]
async fn secret_provider_reads_the_client_key() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/secret");
			then.status(200).json_body(json!({ "clientKey": "key-9" }));
		})
		.await;
	let provider = HttpSecretProvider::new(
		Arc::new(test_reqwest_transport()),
		endpoints(&server).secret,
		StdDuration::from_secs(5),
	);
	let secret = provider.fetch_secret().await.expect("Secret fetch should succeed.");

	mock.assert_async().await;

	assert_eq!(secret.expose(), b"key-9");
}

#[tokio::test]
async fn reqwest_pipeline_recovers_from_an_expired_token() {
	let server = MockServer::start_async().await;
	let _secret = server
		.mock_async(|when, then| {
			when.method(GET).path("/secret");
			then.status(200).json_body(json!({ "clientKey": "key-1" }));
		})
		.await;
	let renew = server
		.mock_async(|when, then| {
			when.method(POST).path("/renew").json_body(json!({ "hashToken": "T1" }));
			then.status(200).json_body(json!({ "hashToken": "T2" }));
		})
		.await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/items").header("authorization", "Bearer T1");
			then.status(401).body("{}");
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/items").header("authorization", "Bearer T2");
			then.status(200).json_body(json!({ "items": [] }));
		})
		.await;
	let store = Arc::new(MemoryStore::with_value("hashToken", "T1"));
	let pipeline = build_reqwest_test_pipeline(&endpoints(&server), store.clone());
	let response = pipeline
		.handle(get_request(&server.url("/items")))
		.await
		.expect("Pipeline should recover from the expired token.");

	assert_eq!(response.status(), 200);

	renew.assert_async().await;
	expired.assert_async().await;
	accepted.assert_async().await;

	assert_eq!(store.snapshot("hashToken").as_deref(), Some("T2"));
}
