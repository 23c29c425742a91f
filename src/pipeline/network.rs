//! Host connectivity observer consulted before every dispatch.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::_prelude::*;

/// Reports whether the host currently has network connectivity.
pub trait NetworkStatus
where
	Self: Send + Sync,
{
	/// Returns false when requests should fail fast without touching the transport.
	fn is_online(&self) -> bool;
}

/// Connectivity flag flipped by the embedding application.
#[derive(Debug)]
pub struct StaticNetworkStatus(AtomicBool);
impl StaticNetworkStatus {
	/// Creates an observer reporting `online`.
	pub fn new(online: bool) -> Self {
		Self(AtomicBool::new(online))
	}

	/// Records a connectivity change.
	pub fn set_online(&self, online: bool) {
		self.0.store(online, Ordering::Release);
	}
}
impl Default for StaticNetworkStatus {
	fn default() -> Self {
		Self::new(true)
	}
}
impl NetworkStatus for StaticNetworkStatus {
	fn is_online(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}
}

/// Remembers the last observed connectivity so transitions are reported once.
#[derive(Debug)]
pub(crate) struct NetworkWatch {
	status: Arc<dyn NetworkStatus>,
	last_online: AtomicBool,
}
impl NetworkWatch {
	pub(crate) fn new(status: Arc<dyn NetworkStatus>) -> Self {
		Self { status, last_online: AtomicBool::new(true) }
	}

	/// Reads the current status, logging online/offline transitions.
	pub(crate) fn is_online(&self) -> bool {
		let online = self.status.is_online();

		if self.last_online.swap(online, Ordering::AcqRel) != online {
			#[cfg(feature = "tracing")]
			{
				if online {
					tracing::info!("Network connectivity restored.");
				} else {
					tracing::warn!("Network connectivity lost; requests fail until it returns.");
				}
			}
		}

		online
	}
}
impl Debug for dyn NetworkStatus {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NetworkStatus").field("online", &self.is_online()).finish()
	}
}
