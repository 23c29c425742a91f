// self
use token_interceptor::{
	_preludet::*,
	store::{MemoryStore, TokenStore},
};

const TOKEN_KEY: &str = "hashToken";

#[tokio::test]
async fn empty_slot_reads_as_none() {
	let store = MemoryStore::default();

	assert_eq!(store.get(TOKEN_KEY).await.expect("Memory store reads should not fail."), None);
}

#[tokio::test]
async fn overwrites_replace_the_whole_value() {
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::with_value(TOKEN_KEY, "T1"));

	store.set(TOKEN_KEY, "T2".into()).await.expect("Memory store writes should not fail.");
	store.set(TOKEN_KEY, "T2".into()).await.expect("Repeated writes should be idempotent.");

	let fetched = store.get(TOKEN_KEY).await.expect("Memory store reads should not fail.");

	assert_eq!(fetched.as_deref(), Some("T2"));
	assert_eq!(store.get("other").await.expect("Memory store reads should not fail."), None);
}

#[tokio::test]
async fn clones_share_the_same_slots() {
	let store = MemoryStore::default();
	let clone = store.clone();

	clone.set(TOKEN_KEY, "T3".into()).await.expect("Memory store writes should not fail.");

	assert_eq!(store.snapshot(TOKEN_KEY).as_deref(), Some("T3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_tear_values() {
	let store = Arc::new(MemoryStore::default());
	let mut tasks = tokio::task::JoinSet::new();

	for i in 0..32 {
		let store = store.clone();

		tasks.spawn(async move {
			store.set(TOKEN_KEY, format!("token-{i}")).await.expect("Writes should not fail.");

			store.get(TOKEN_KEY).await.expect("Reads should not fail.")
		});
	}

	while let Some(joined) = tasks.join_next().await {
		let value = joined.expect("Task should not panic.").expect("Slot should be populated.");

		assert!(value.starts_with("token-"));
	}

	let last = store.snapshot(TOKEN_KEY).expect("Slot should hold the final write.");

	assert!(last["token-".len()..].parse::<usize>().is_ok_and(|i| i < 32));
}
