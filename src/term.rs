//! The process-wide termination flag described in the design: written once
//! by a signal handler, polled by every session at its suspension points.
//! No thread ever blocks on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
	pub fn new() -> Self {
		Self(Arc::new(AtomicBool::new(false)))
	}

	/// Set once at shutdown. Never cleared.
	pub fn set(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_set(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}
