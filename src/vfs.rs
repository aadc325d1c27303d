//! The mutation surface tying the overlay stack and resolver together
//! (§4.5), plus the working-directory record (§3) every session carries.
//! Wraps get/set/remove-node-at-path operations, generalized across a
//! stack of named overlays instead of a single root.

use crate::ast::AstNode;
use crate::error::{VfsError, VfsResult};
use crate::node::directory::DirectoryNode;
use crate::node::file::FileNode;
use crate::node::{unparented, ArcNode, Node, WeakNode};
use crate::overlay::OverlayStack;
use crate::path;
use crate::resolver::{self, ConflictPolicy, Hit, ListEntry};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// The per-session working-directory record (§3): the normalized absolute
/// path, which overlays currently intersect it, the primary overlay that
/// writes target, and the active conflict policy.
#[derive(Debug)]
pub struct WorkingDirectory {
	cwd: RwLock<String>,
	primary: RwLock<usize>,
	policy: RwLock<ConflictPolicy>,
}

impl WorkingDirectory {
	fn new() -> Self {
		WorkingDirectory {
			cwd: RwLock::new("/".to_string()),
			primary: RwLock::new(0),
			policy: RwLock::new(ConflictPolicy::default()),
		}
	}

	pub fn path(&self) -> String {
		self.cwd.read().expect("poisoned lock").clone()
	}

	pub fn primary(&self) -> usize {
		*self.primary.read().expect("poisoned lock")
	}

	pub fn policy(&self) -> ConflictPolicy {
		*self.policy.read().expect("poisoned lock")
	}

	pub fn set_policy(&self, policy: ConflictPolicy) {
		*self.policy.write().expect("poisoned lock") = policy;
	}
}

/// The overlay-aware virtual filesystem: an [`OverlayStack`] plus the
/// working directory and the mutation operations of §4.5.
#[derive(Debug)]
pub struct Vfs {
	pub overlays: OverlayStack,
	pub cwd: WorkingDirectory,
}

impl Default for Vfs {
	fn default() -> Self {
		Self::new()
	}
}

impl Vfs {
	pub fn new() -> Self {
		Vfs {
			overlays: OverlayStack::new(),
			cwd: WorkingDirectory::new(),
		}
	}

	/// Overlay ids whose tree contains `self.cwd`'s directory, used to
	/// recompute the primary overlay (§4.4 "Primary overlay recomputation
	/// happens whenever `cwd` changes or an overlay is removed").
	pub fn overlays_at_cwd(&self) -> VfsResult<Vec<usize>> {
		let cwd = self.cwd.path();
		let hits = resolver::resolve_multi(&self.overlays, &cwd, None)?;
		Ok(hits.into_iter().filter(|h| h.node.is_directory()).map(|h| h.overlay_id).collect())
	}

	/// Recomputes and stores the primary overlay for the current `cwd`
	/// under the active policy.
	pub fn recompute_primary(&self) -> VfsResult<usize> {
		let candidates = self.overlays_at_cwd()?;
		let primary = resolver::select_overlay(self.cwd.policy(), &candidates, self.cwd.primary())?;
		*self.cwd.primary.write().expect("poisoned lock") = primary;
		Ok(primary)
	}

	pub fn set_policy(&self, policy: ConflictPolicy) -> VfsResult<()> {
		self.cwd.set_policy(policy);
		self.recompute_primary()?;
		Ok(())
	}

	/// Changes the working directory to `normalize(cwd, operand)`, failing
	/// if no overlay has a directory there.
	pub fn chdir(&self, operand: &str) -> VfsResult<()> {
		let target = path::normalize(&self.cwd.path(), operand);
		let hits = resolver::resolve_multi(&self.overlays, &target, None)?;
		if !hits.iter().any(|h| h.node.is_directory()) {
			return Err(VfsError::not_found(target));
		}
		*self.cwd.cwd.write().expect("poisoned lock") = target;
		self.recompute_primary()?;
		Ok(())
	}

	pub fn normalize(&self, operand: &str) -> String {
		path::normalize(&self.cwd.path(), operand)
	}

	/// Creates missing intermediate directories as it walks `path`'s
	/// components in overlay `id` (§4.5 `mkdir`). A no-op if `path` already
	/// names a directory; fails if an intermediate component is not a
	/// directory.
	pub fn mkdir(&self, path: &str, id: usize) -> VfsResult<()> {
		let root = self.overlays.root_of(id)?;
		let mut node = root;
		for component in path::split(path) {
			let dir = node
				.downcast_ref::<DirectoryNode>()
				.map_err(|_| VfsError::external(format!("`{component}`'s parent is not a directory")))?;
			if let Some(existing) = dir.get(component) {
				if !existing.is_directory() {
					return Err(VfsError::external(format!("`{component}` exists and is not a directory")));
				}
				node = existing;
			} else {
				let child = DirectoryNode::new_arc(component, weak(&node));
				dir.insert(component, child.clone())?;
				node = child;
			}
		}
		self.overlays.mark_dirty(id)?;
		Ok(())
	}

	/// Ensures `path`'s parent directory exists and creates a `File` there
	/// if absent; fails if the existing node is not a `File` (§4.5 `touch`).
	pub fn touch(&self, path: &str, id: usize) -> VfsResult<()> {
		let (parent_path, name) = split_parent(path);
		self.mkdir(&parent_path, id)?;
		let parent = resolver::resolve_for_overlay(&self.overlays, &parent_path, id)?;
		let dir = parent
			.downcast_ref::<DirectoryNode>()
			.map_err(|_| VfsError::external(format!("`{parent_path}` is not a directory")))?;
		if let Some(existing) = dir.get(&name) {
			if existing.downcast_ref::<FileNode>().is_err() {
				return Err(VfsError::external(format!("`{path}` exists and is not a file")));
			}
		} else {
			dir.insert(&name, FileNode::new_arc(&name, weak(&parent)))?;
		}
		self.overlays.mark_dirty(id)?;
		Ok(())
	}

	/// Writes `bytes` to `path` in overlay `id`, creating parent
	/// directories and the file itself as `touch` would; the existing node,
	/// if any, must be `File` or `Ast` (§4.5 `write`).
	pub fn write(&self, path: &str, bytes: &[u8], id: usize) -> VfsResult<()> {
		let (parent_path, name) = split_parent(path);
		self.mkdir(&parent_path, id)?;
		let parent = resolver::resolve_for_overlay(&self.overlays, &parent_path, id)?;
		let dir = parent
			.downcast_ref::<DirectoryNode>()
			.map_err(|_| VfsError::external(format!("`{parent_path}` is not a directory")))?;
		let node = match dir.get(&name) {
			Some(existing) => existing,
			None => {
				let file = FileNode::new_arc(&name, weak(&parent));
				dir.insert(&name, file.clone())?;
				file
			}
		};
		node.write(bytes)?;
		self.overlays.mark_dirty(id)?;
		Ok(())
	}

	/// Reads `path`. If `overlay` is given, that overlay's node must exist
	/// and be readable; otherwise hits are aggregated and the active conflict
	/// policy disambiguates when more than one overlay has it (§4.5 `read`,
	/// §3 invariant: "read fails unless the caller specified an overlay or
	/// policy disambiguates").
	pub fn read(&self, path: &str, overlay: Option<usize>) -> VfsResult<Vec<u8>> {
		match overlay {
			Some(id) => resolver::resolve_for_overlay(&self.overlays, path, id)?.read(),
			None => {
				let mut hits = resolver::resolve_multi(&self.overlays, path, None)?;
				let hit = match hits.len() {
					0 => return Err(VfsError::not_found(path)),
					1 => hits.remove(0),
					_ => {
						let ids: Vec<usize> = hits.iter().map(|h| h.overlay_id).collect();
						let chosen = resolver::select_overlay(self.cwd.policy(), &ids, self.cwd.primary())?;
						hits.into_iter()
							.find(|h| h.overlay_id == chosen)
							.expect("select_overlay returned a candidate id")
					}
				};
				hit.node.read()
			}
		}
	}

	/// Places a preconstructed node into `dir_path` in overlay `id` (§4.5
	/// `addNode`), used by the container loader and AST builders.
	pub fn add_node(&self, dir_path: &str, name: &str, node: ArcNode, id: usize) -> VfsResult<()> {
		self.mkdir(dir_path, id)?;
		let parent = resolver::resolve_for_overlay(&self.overlays, dir_path, id)?;
		let dir = parent
			.downcast_ref::<DirectoryNode>()
			.map_err(|_| VfsError::external(format!("`{dir_path}` is not a directory")))?;
		node.set_parent(weak(&parent));
		dir.replace(name, node);
		self.overlays.mark_dirty(id)?;
		Ok(())
	}

	/// Detaches `path` from its parent in overlay `id` (§4.5 `rm`). Fails
	/// on `"/"`.
	pub fn rm(&self, path: &str, id: usize) -> VfsResult<()> {
		let normalized = path::normalize("/", path);
		if normalized == "/" {
			return Err(VfsError::external("cannot remove the root"));
		}
		let (parent_path, name) = split_parent(&normalized);
		let parent = resolver::resolve_for_overlay(&self.overlays, &parent_path, id)?;
		let dir = parent
			.downcast_ref::<DirectoryNode>()
			.map_err(|_| VfsError::external(format!("`{parent_path}` is not a directory")))?;
		if dir.remove(&name).is_none() {
			return Err(VfsError::not_found(normalized));
		}
		self.overlays.mark_dirty(id)?;
		Ok(())
	}

	/// Moves `src` to `dst` within overlay `id` (§4.5 `mv`): resolves
	/// `src`, ensures `dst`'s parent directory exists, and relinks.
	pub fn mv(&self, src: &str, dst: &str, id: usize) -> VfsResult<()> {
		let (src_parent_path, src_name) = split_parent(src);
		let src_parent = resolver::resolve_for_overlay(&self.overlays, &src_parent_path, id)?;
		let src_dir = src_parent
			.downcast_ref::<DirectoryNode>()
			.map_err(|_| VfsError::external(format!("`{src_parent_path}` is not a directory")))?;
		let node = src_dir.remove(&src_name).ok_or_else(|| VfsError::not_found(src))?;

		let (dst_parent_path, dst_name) = split_parent(dst);
		self.mkdir(&dst_parent_path, id)?;
		let dst_parent = resolver::resolve_for_overlay(&self.overlays, &dst_parent_path, id)?;
		let dst_dir = dst_parent
			.downcast_ref::<DirectoryNode>()
			.map_err(|_| VfsError::external(format!("`{dst_parent_path}` is not a directory")))?;
		node.set_parent(weak(&dst_parent));
		node.set_name(dst_name.clone());
		dst_dir.replace(&dst_name, node);
		self.overlays.mark_dirty(id)?;
		Ok(())
	}

	/// Aliases the node at `src` under `dst` (§4.5 `link`): both parents'
	/// maps point at the same node object, so a write through either name
	/// is visible through the other.
	pub fn link(&self, src: &str, dst: &str, id: usize) -> VfsResult<()> {
		let node = resolver::resolve_for_overlay(&self.overlays, src, id)?;
		let (dst_parent_path, dst_name) = split_parent(dst);
		self.mkdir(&dst_parent_path, id)?;
		let dst_parent = resolver::resolve_for_overlay(&self.overlays, &dst_parent_path, id)?;
		let dst_dir = dst_parent
			.downcast_ref::<DirectoryNode>()
			.map_err(|_| VfsError::external(format!("`{dst_parent_path}` is not a directory")))?;
		dst_dir.replace(&dst_name, node);
		self.overlays.mark_dirty(id)?;
		Ok(())
	}

	pub fn list_dir(&self, path: &str, allowed: Option<&[usize]>) -> VfsResult<BTreeMap<String, ListEntry>> {
		resolver::list_dir(&self.overlays, path, allowed)
	}

	pub fn resolve(&self, path: &str) -> VfsResult<Hit> {
		resolver::resolve(&self.overlays, path, None)
	}

	pub fn resolve_for_overlay(&self, path: &str, id: usize) -> VfsResult<ArcNode> {
		resolver::resolve_for_overlay(&self.overlays, path, id)
	}

	/// Returns the `AstNode` at `path` in overlay `id`, failing with
	/// NotFound if the node there is not an AST node.
	pub fn ast_node_at(&self, path: &str, id: usize) -> VfsResult<ArcNode> {
		let node = resolver::resolve_for_overlay(&self.overlays, path, id)?;
		node.downcast_ref::<AstNode>().map(|_| ()).map_err(|_| VfsError::external(format!("`{path}` is not an AST node")))?;
		Ok(node)
	}
}

fn weak(node: &ArcNode) -> WeakNode {
	std::sync::Arc::downgrade(node)
}

fn split_parent(path: &str) -> (String, String) {
	let normalized = path::normalize("/", path);
	(path::dirname(&normalized), path::basename(&normalized).to_string())
}

/// A root with no parent, exported for callers that build standalone
/// overlay roots outside the stack (the container loader's structural
/// pass).
pub fn fresh_root() -> ArcNode {
	DirectoryNode::new_arc("/", unparented())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn touch_write_read_roundtrip() {
		let vfs = Vfs::new();
		vfs.touch("/x", 0).unwrap();
		vfs.write("/x", b"hello", 0).unwrap();
		assert_eq!(vfs.read("/x", Some(0)).unwrap(), b"hello");
	}

	#[test]
	fn mkdir_is_idempotent() {
		let vfs = Vfs::new();
		vfs.mkdir("/a/b", 0).unwrap();
		vfs.mkdir("/a/b", 0).unwrap();
		assert!(vfs.resolve_for_overlay("/a/b", 0).unwrap().is_directory());
	}

	#[test]
	fn rm_root_fails() {
		let vfs = Vfs::new();
		assert!(vfs.rm("/", 0).is_err());
	}

	#[test]
	fn write_then_overwrite_reads_latest() {
		let vfs = Vfs::new();
		vfs.write("/x", b"a", 0).unwrap();
		vfs.write("/x", b"b", 0).unwrap();
		assert_eq!(vfs.read("/x", Some(0)).unwrap(), b"b");
	}

	#[test]
	fn link_aliases_same_node() {
		let vfs = Vfs::new();
		vfs.touch("/a", 0).unwrap();
		vfs.link("/a", "/b", 0).unwrap();
		vfs.write("/a", b"x", 0).unwrap();
		assert_eq!(vfs.read("/b", Some(0)).unwrap(), b"x");
	}

	#[test]
	fn mv_relocates_node() {
		let vfs = Vfs::new();
		vfs.write("/a", b"x", 0).unwrap();
		vfs.mv("/a", "/dir/b", 0).unwrap();
		assert!(vfs.resolve_for_overlay("/a", 0).is_err());
		assert_eq!(vfs.read("/dir/b", Some(0)).unwrap(), b"x");
	}

	#[test]
	fn dirty_bit_set_after_write_and_cleared_after_save() {
		let vfs = Vfs::new();
		let id = vfs.overlays.register("alt").unwrap();
		vfs.write("/x", b"1", id).unwrap();
		assert!(vfs.overlays.dirty(id).unwrap());
		vfs.overlays.clear_dirty(id).unwrap();
		assert!(!vfs.overlays.dirty(id).unwrap());
	}

	#[test]
	fn cross_overlay_read_without_overlay_arg_requires_single_hit() {
		let vfs = Vfs::new();
		let alt = vfs.overlays.register("alt").unwrap();
		vfs.write("/x", b"base", 0).unwrap();
		vfs.write("/x", b"alt", alt).unwrap();
		assert!(vfs.read("/x", None).is_err());
		vfs.set_policy(ConflictPolicy::Newest).unwrap();
		assert_eq!(vfs.read("/x", Some(alt)).unwrap(), b"alt");
	}

	#[test]
	fn policy_disambiguates_read_with_no_overlay_given() {
		// §8 scenario 1: with no `overlay` argument, `read` must consult the
		// active conflict policy instead of always failing with `Conflict`.
		let vfs = Vfs::new();
		vfs.write("/a/x", b"1", 0).unwrap();
		let alt = vfs.overlays.register("alt").unwrap();
		vfs.write("/a/x", b"2", alt).unwrap();

		vfs.set_policy(ConflictPolicy::Newest).unwrap();
		assert_eq!(vfs.read("/a/x", None).unwrap(), b"2");

		vfs.set_policy(ConflictPolicy::Oldest).unwrap();
		assert_eq!(vfs.read("/a/x", None).unwrap(), b"1");
	}

	#[test]
	fn manual_policy_still_conflicts_when_primary_has_no_hit() {
		// §3 invariant: Manual only disambiguates when the session's primary
		// overlay is among the hits; otherwise `Conflict` still surfaces.
		let vfs = Vfs::new();
		let alt = vfs.overlays.register("alt").unwrap();
		let third = vfs.overlays.register("third").unwrap();
		vfs.write("/a/x", b"1", 0).unwrap();
		vfs.write("/a/x", b"2", alt).unwrap();
		vfs.touch("/marker", third).unwrap();

		// Newest makes `third` (the highest id intersecting cwd `/`) primary.
		vfs.set_policy(ConflictPolicy::Newest).unwrap();
		assert_eq!(vfs.cwd.primary(), third);

		vfs.set_policy(ConflictPolicy::Manual).unwrap();
		assert!(vfs.read("/a/x", None).is_err());
	}
}
