use crate::error::{VfsError, VfsResult};
use crate::node::{ArcNode, Node, NodeKind, WeakNode};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A plain in-memory directory: an ordered map from child name to child node
/// (§3 "Directory"). Names are unique within a parent.
#[derive(Debug)]
pub struct DirectoryNode {
	name: RwLock<String>,
	parent: RwLock<WeakNode>,
	children: RwLock<BTreeMap<String, ArcNode>>,
}

impl DirectoryNode {
	pub fn new(name: impl Into<String>, parent: WeakNode) -> Self {
		Self {
			name: RwLock::new(name.into()),
			parent: RwLock::new(parent),
			children: RwLock::new(BTreeMap::new()),
		}
	}

	pub fn new_arc(name: impl Into<String>, parent: WeakNode) -> ArcNode {
		std::sync::Arc::new(Self::new(name, parent))
	}

	/// Looks up a direct child by name.
	pub fn get(&self, name: &str) -> Option<ArcNode> {
		self.children.read().expect("poisoned lock").get(name).cloned()
	}

	/// Inserts `node` under `name`, failing if the name is already taken.
	pub fn insert(&self, name: impl Into<String>, node: ArcNode) -> VfsResult<()> {
		let name = name.into();
		let mut children = self.children.write().expect("poisoned lock");
		if children.contains_key(&name) {
			return Err(VfsError::external(format!("`{name}` already exists")));
		}
		children.insert(name, node);
		Ok(())
	}

	/// Inserts `node` under `name`, overwriting whatever was there. Used by
	/// `mv` and the container reader's structural pass.
	pub fn replace(&self, name: impl Into<String>, node: ArcNode) {
		self.children
			.write()
			.expect("poisoned lock")
			.insert(name.into(), node);
	}

	pub fn remove(&self, name: &str) -> Option<ArcNode> {
		self.children.write().expect("poisoned lock").remove(name)
	}

	pub fn names(&self) -> Vec<String> {
		self.children.read().expect("poisoned lock").keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.children.read().expect("poisoned lock").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl Node for DirectoryNode {
	fn kind(&self) -> NodeKind {
		NodeKind::Dir
	}

	fn name(&self) -> String {
		self.name.read().expect("poisoned lock").clone()
	}

	fn set_name(&self, name: String) {
		*self.name.write().expect("poisoned lock") = name;
	}

	fn parent(&self) -> WeakNode {
		self.parent.read().expect("poisoned lock").clone()
	}

	fn set_parent(&self, parent: WeakNode) {
		*self.parent.write().expect("poisoned lock") = parent;
	}

	fn is_directory(&self) -> bool {
		true
	}

	fn read(&self) -> VfsResult<Vec<u8>> {
		Err(VfsError::external("cannot read a directory"))
	}

	fn write(&self, _bytes: &[u8]) -> VfsResult<()> {
		Err(VfsError::external("cannot write a directory"))
	}

	fn children(&self) -> VfsResult<BTreeMap<String, ArcNode>> {
		Ok(self.children.read().expect("poisoned lock").clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::unparented;

	#[test]
	fn insert_and_remove() {
		let dir = DirectoryNode::new("root", unparented());
		dir.insert("a", DirectoryNode::new_arc("a", unparented())).unwrap();
		assert!(dir.get("a").is_some());
		assert!(dir.insert("a", DirectoryNode::new_arc("a", unparented())).is_err());
		assert!(dir.remove("a").is_some());
		assert!(dir.get("a").is_none());
	}

	#[test]
	fn read_write_fail() {
		let dir = DirectoryNode::new("root", unparented());
		assert!(dir.read().is_err());
		assert!(dir.write(b"x").is_err());
	}
}
