//! The bounded pool of in-flight server sessions. A single mutex covers
//! every field, per the design's concurrency model; there is no finer
//! locking to get wrong.

use std::sync::Mutex;

use tokio::task::JoinHandle;

struct Slot {
	occupied: bool,
	handle: Option<JoinHandle<()>>,
}

pub struct SessionSlotTable {
	slots: Mutex<Vec<Slot>>,
}

impl SessionSlotTable {
	pub fn new(capacity: usize) -> Self {
		let slots = (0..capacity).map(|_| Slot { occupied: false, handle: None }).collect();
		Self { slots: Mutex::new(slots) }
	}

	pub fn capacity(&self) -> usize {
		self.slots.lock().unwrap().len()
	}

	/// Scans for the first free slot, marking it occupied. Returns `None`
	/// if every slot is in use.
	pub fn acquire(&self) -> Option<usize> {
		let mut slots = self.slots.lock().unwrap();
		let index = slots.iter().position(|s| !s.occupied)?;
		slots[index].occupied = true;
		Some(index)
	}

	pub fn set_handle(&self, index: usize, handle: JoinHandle<()>) {
		let mut slots = self.slots.lock().unwrap();
		slots[index].handle = Some(handle);
	}

	pub fn release(&self, index: usize) {
		let mut slots = self.slots.lock().unwrap();
		slots[index].occupied = false;
		slots[index].handle = None;
	}

	/// Joins every still-running worker; used once at shutdown after the
	/// listener's accept loop has exited.
	pub async fn join_all(&self) {
		let handles: Vec<_> = {
			let mut slots = self.slots.lock().unwrap();
			slots.iter_mut().filter_map(|s| s.handle.take()).collect()
		};
		for handle in handles {
			let _ = handle.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn acquire_respects_capacity() {
		let table = SessionSlotTable::new(2);
		let a = table.acquire().unwrap();
		let b = table.acquire().unwrap();
		assert_ne!(a, b);
		assert!(table.acquire().is_none());

		table.release(a);
		assert_eq!(table.acquire(), Some(a));
	}
}
