//! The overlay stack (§4.3, §3 "Overlay"): a sequence of named root
//! directories layered atop one base. Resolution folds a `Vec<ArcNode>` to
//! find the first overlay with a shadowed child, generalized from "one
//! node's children" to "the whole named-root stack a session holds" — here
//! an overlay is a top-level root rather than a single wrapped node.

use crate::error::{VfsError, VfsResult};
use crate::node::directory::DirectoryNode;
use crate::node::{unparented, ArcNode};
use std::sync::RwLock;

/// A single named root (§3 "Overlay"): a root directory, optionally bound to
/// a source file it was loaded from/saves to, with a dirty flag the
/// autosave engine and mutation operations maintain.
#[derive(Debug)]
pub struct Overlay {
	name: String,
	root: ArcNode,
	source: RwLock<Option<String>>,
	source_hash: RwLock<Option<String>>,
	dirty: RwLock<bool>,
}

impl Overlay {
	fn new(name: impl Into<String>) -> Self {
		let name = name.into();
		Overlay {
			root: DirectoryNode::new_arc("/", unparented()),
			name,
			source: RwLock::new(None),
			source_hash: RwLock::new(None),
			dirty: RwLock::new(false),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn root(&self) -> &ArcNode {
		&self.root
	}

	pub fn source(&self) -> Option<String> {
		self.source.read().expect("poisoned lock").clone()
	}

	pub fn source_hash(&self) -> Option<String> {
		self.source_hash.read().expect("poisoned lock").clone()
	}

	pub fn set_source(&self, path: Option<String>) {
		*self.source.write().expect("poisoned lock") = path;
	}

	pub fn set_source_hash(&self, hash: Option<String>) {
		*self.source_hash.write().expect("poisoned lock") = hash;
	}

	pub fn dirty(&self) -> bool {
		*self.dirty.read().expect("poisoned lock")
	}

	fn set_dirty(&self, value: bool) {
		*self.dirty.write().expect("poisoned lock") = value;
	}
}

/// The session's stack of overlays (§4.3). Ids are contiguous `0..N-1` at
/// all times; overlay 0 is the base and can never be unregistered or marked
/// dirty.
#[derive(Debug, Default)]
pub struct OverlayStack {
	overlays: RwLock<Vec<Overlay>>,
}

impl OverlayStack {
	/// A fresh stack containing only the base overlay (id 0, name "base").
	pub fn new() -> Self {
		let stack = OverlayStack {
			overlays: RwLock::new(Vec::new()),
		};
		stack.overlays.write().expect("poisoned lock").push(Overlay::new("base"));
		stack
	}

	pub fn len(&self) -> usize {
		self.overlays.read().expect("poisoned lock").len()
	}

	pub fn is_empty(&self) -> bool {
		false // overlay 0 always exists (§3 invariant)
	}

	/// Registers a new overlay with an empty root, appended at the next id.
	/// Fails if `name` is already in use (§4.3).
	pub fn register(&self, name: impl Into<String>) -> VfsResult<usize> {
		let name = name.into();
		let mut overlays = self.overlays.write().expect("poisoned lock");
		if overlays.iter().any(|o| o.name == name) {
			return Err(VfsError::external(format!("overlay name `{name}` already in use")));
		}
		overlays.push(Overlay::new(name));
		Ok(overlays.len() - 1)
	}

	/// Registers a new overlay with a preconstructed root (used by the
	/// container loader to mount a just-read snapshot).
	pub fn register_with_root(&self, name: impl Into<String>, root: ArcNode) -> VfsResult<usize> {
		let name = name.into();
		let mut overlays = self.overlays.write().expect("poisoned lock");
		if overlays.iter().any(|o| o.name == name) {
			return Err(VfsError::external(format!("overlay name `{name}` already in use")));
		}
		overlays.push(Overlay {
			name,
			root,
			source: RwLock::new(None),
			source_hash: RwLock::new(None),
			dirty: RwLock::new(false),
		});
		Ok(overlays.len() - 1)
	}

	/// Removes overlay `id`, shifting every higher id down by one (§4.3).
	/// Fails for `id == 0`.
	pub fn unregister(&self, id: usize) -> VfsResult<()> {
		if id == 0 {
			return Err(VfsError::external("the base overlay cannot be unmounted"));
		}
		let mut overlays = self.overlays.write().expect("poisoned lock");
		if id >= overlays.len() {
			return Err(VfsError::OverlayNotFound(id.to_string()));
		}
		overlays.remove(id);
		Ok(())
	}

	pub fn find_by_name(&self, name: &str) -> Option<usize> {
		self.overlays.read().expect("poisoned lock").iter().position(|o| o.name == name)
	}

	pub fn name_of(&self, id: usize) -> VfsResult<String> {
		self.with_overlay(id, |o| o.name.clone())
	}

	pub fn root_of(&self, id: usize) -> VfsResult<ArcNode> {
		self.with_overlay(id, |o| o.root.clone())
	}

	pub fn dirty(&self, id: usize) -> VfsResult<bool> {
		self.with_overlay(id, |o| o.dirty())
	}

	/// Marks overlay `id` dirty; a no-op for `id == 0` (§4.3, §3 invariant:
	/// "dirty bits of overlay 0 are always false").
	pub fn mark_dirty(&self, id: usize) -> VfsResult<()> {
		if id == 0 {
			return Ok(());
		}
		self.with_overlay(id, |o| o.set_dirty(true))
	}

	pub fn clear_dirty(&self, id: usize) -> VfsResult<()> {
		self.with_overlay(id, |o| o.set_dirty(false))
	}

	pub fn source(&self, id: usize) -> VfsResult<Option<String>> {
		self.with_overlay(id, |o| o.source())
	}

	pub fn set_source(&self, id: usize, path: Option<String>) -> VfsResult<()> {
		self.with_overlay(id, |o| o.set_source(path))
	}

	pub fn source_hash(&self, id: usize) -> VfsResult<Option<String>> {
		self.with_overlay(id, |o| o.source_hash())
	}

	pub fn set_source_hash(&self, id: usize, hash: Option<String>) -> VfsResult<()> {
		self.with_overlay(id, |o| o.set_source_hash(hash))
	}

	pub fn ids(&self) -> Vec<usize> {
		(0..self.len()).collect()
	}

	pub fn dirty_ids(&self) -> Vec<usize> {
		self.overlays
			.read()
			.expect("poisoned lock")
			.iter()
			.enumerate()
			.filter(|(_, o)| o.dirty())
			.map(|(i, _)| i)
			.collect()
	}

	fn with_overlay<T>(&self, id: usize, f: impl FnOnce(&Overlay) -> T) -> VfsResult<T> {
		let overlays = self.overlays.read().expect("poisoned lock");
		let overlay = overlays.get(id).ok_or_else(|| VfsError::OverlayNotFound(id.to_string()))?;
		Ok(f(overlay))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base_overlay_exists_and_cannot_be_unmounted() {
		let stack = OverlayStack::new();
		assert_eq!(stack.len(), 1);
		assert!(stack.unregister(0).is_err());
	}

	#[test]
	fn register_and_unregister_shifts_ids() {
		let stack = OverlayStack::new();
		let a = stack.register("a").unwrap();
		let b = stack.register("b").unwrap();
		assert_eq!(a, 1);
		assert_eq!(b, 2);
		stack.unregister(a).unwrap();
		assert_eq!(stack.name_of(1).unwrap(), "b");
		assert_eq!(stack.len(), 2);
	}

	#[test]
	fn duplicate_name_rejected() {
		let stack = OverlayStack::new();
		stack.register("alt").unwrap();
		assert!(stack.register("alt").is_err());
	}

	#[test]
	fn base_overlay_dirty_bit_never_sets() {
		let stack = OverlayStack::new();
		stack.mark_dirty(0).unwrap();
		assert!(!stack.dirty(0).unwrap());
	}

	#[test]
	fn dirty_bit_tracks_mutation_and_clears_on_save() {
		let stack = OverlayStack::new();
		let id = stack.register("alt").unwrap();
		assert!(!stack.dirty(id).unwrap());
		stack.mark_dirty(id).unwrap();
		assert!(stack.dirty(id).unwrap());
		stack.clear_dirty(id).unwrap();
		assert!(!stack.dirty(id).unwrap());
	}
}
