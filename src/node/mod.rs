//! The typed node model (§3, §4.2): a closed, polymorphic hierarchy of
//! {Dir, File, Ast, Mount, Library} nodes living behind `Arc<dyn Node>`,
//! downcastable via [`crate::as_any_cast::AsAnyCast`] to recover a concrete
//! node type.

pub mod directory;
pub mod file;
pub mod mount;

use crate::as_any_cast::AsAnyCast;
use crate::error::{VfsError, VfsResult};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

pub type ArcNode = Arc<dyn Node>;
pub type WeakNode = Weak<dyn Node>;

/// The closed node-kind set of §3. Matches `VfsNode::Kind` in
/// `original_source/VfsShell/codex.h` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
	Dir,
	File,
	Ast,
	Mount,
	Library,
}

impl NodeKind {
	/// The single-character code used by `listDir` (§4.4) to report which
	/// kinds were observed for a name across overlays.
	pub fn code(self) -> char {
		match self {
			NodeKind::Dir => 'd',
			NodeKind::File => 'f',
			NodeKind::Ast => 'a',
			NodeKind::Mount => 'm',
			NodeKind::Library => 'l',
		}
	}
}

/// The four universal operations every node exposes (§3). Non-applicable
/// operations fail with [`VfsError`] rather than panicking.
pub trait Node: AsAnyCast + Debug + Send + Sync {
	fn kind(&self) -> NodeKind;
	fn name(&self) -> String;
	fn set_name(&self, name: String);
	fn parent(&self) -> WeakNode;
	fn set_parent(&self, parent: WeakNode);
	fn is_directory(&self) -> bool;
	fn read(&self) -> VfsResult<Vec<u8>>;
	fn write(&self, bytes: &[u8]) -> VfsResult<()>;
	fn children(&self) -> VfsResult<BTreeMap<String, ArcNode>>;
}

impl dyn Node {
	pub fn downcast_ref<T: Node>(&self) -> VfsResult<&T> {
		self.as_any()
			.downcast_ref()
			.ok_or_else(|| VfsError::external(format!("cannot downcast {}", self.type_name())))
	}

	pub fn downcast_arc<T: Node>(self: &Arc<Self>) -> VfsResult<Arc<T>> {
		if self.as_ref().as_any().is::<T>() {
			Ok(self.clone().into_arc_any().downcast::<T>().unwrap())
		} else {
			Err(VfsError::external(format!(
				"cannot downcast {}",
				self.as_ref().type_name()
			)))
		}
	}
}

/// An empty [`WeakNode`], for nodes constructed without a known parent yet
/// (the VFS root, or nodes under construction during container load).
pub fn unparented() -> WeakNode {
	Weak::<directory::DirectoryNode>::new()
}
