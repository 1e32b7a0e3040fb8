//! Type-erased handles held by the runtime state
//!
//! Lets the host register external collaborators (database handle, credential
//! verifier, ...) without the admission core depending on their types. One
//! value per type.

use std::any::{Any, TypeId};
use std::collections::HashMap;

pub struct Extensions {
	map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
	pub fn new() -> Self {
		Self { map: HashMap::new() }
	}

	/// Register a handle, returning the one it replaced
	pub fn insert<T: Send + Sync + 'static>(&mut self, val: T) -> Option<T> {
		self.map
			.insert(TypeId::of::<T>(), Box::new(val))
			.and_then(|prev| prev.downcast::<T>().ok())
			.map(|prev| *prev)
	}

	pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
		self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>()
	}

	pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
		self.map.contains_key(&TypeId::of::<T>())
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}
}

impl Default for Extensions {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for Extensions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Extensions").field("len", &self.map.len()).finish()
	}
}


// vim: ts=4
