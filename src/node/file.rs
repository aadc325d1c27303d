use crate::error::VfsResult;
use crate::node::{ArcNode, Node, NodeKind, WeakNode};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A plain byte-string leaf (§3 "File"). `read`/`write` delegate trivially.
#[derive(Debug)]
pub struct FileNode {
	name: RwLock<String>,
	parent: RwLock<WeakNode>,
	contents: RwLock<Vec<u8>>,
}

impl FileNode {
	pub fn new(name: impl Into<String>, parent: WeakNode) -> Self {
		Self {
			name: RwLock::new(name.into()),
			parent: RwLock::new(parent),
			contents: RwLock::new(Vec::new()),
		}
	}

	pub fn new_arc(name: impl Into<String>, parent: WeakNode) -> ArcNode {
		std::sync::Arc::new(Self::new(name, parent))
	}

	pub fn with_contents(name: impl Into<String>, parent: WeakNode, contents: Vec<u8>) -> ArcNode {
		std::sync::Arc::new(Self {
			name: RwLock::new(name.into()),
			parent: RwLock::new(parent),
			contents: RwLock::new(contents),
		})
	}
}

impl Node for FileNode {
	fn kind(&self) -> NodeKind {
		NodeKind::File
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
		false
	}

	fn read(&self) -> VfsResult<Vec<u8>> {
		Ok(self.contents.read().expect("poisoned lock").clone())
	}

	fn write(&self, bytes: &[u8]) -> VfsResult<()> {
		*self.contents.write().expect("poisoned lock") = bytes.to_vec();
		Ok(())
	}

	fn children(&self) -> VfsResult<BTreeMap<String, ArcNode>> {
		Ok(BTreeMap::new())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::unparented;

	#[test]
	fn write_then_read() {
		let file = FileNode::new("x", unparented());
		file.write(b"hello").unwrap();
		assert_eq!(file.read().unwrap(), b"hello");
		file.write(b"world").unwrap();
		assert_eq!(file.read().unwrap(), b"world");
	}

	#[test]
	fn empty_file_roundtrips() {
		let file = FileNode::new("x", unparented());
		assert_eq!(file.read().unwrap(), Vec::<u8>::new());
	}
}
