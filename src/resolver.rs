//! Path resolution across the overlay stack (§4.4). Every resolver here is
//! a fold over the overlay list around one traversal primitive, folding a
//! list of candidate roots down to the first that has the requested child
//! (§9 "Cross-overlay resolution").

use crate::error::{VfsError, VfsResult};
use crate::node::{ArcNode, NodeKind};
use crate::overlay::OverlayStack;
use crate::path;
use std::collections::BTreeMap;

/// A resolved hit: which overlay a path was found in, and the node itself
/// (§3 "Resolver hit").
#[derive(Clone)]
pub struct Hit {
	pub overlay_id: usize,
	pub node: ArcNode,
}

/// Walks `path`'s components from `root`, returning `None` as soon as a
/// non-directory node is traversed or a name is missing (§4.4). This is the
/// single traversal primitive every higher-level resolver folds over (§9).
pub fn traverse(root: &ArcNode, path: &str) -> Option<ArcNode> {
	let mut node = root.clone();
	for component in path::split(path) {
		let children = node.children().ok()?;
		node = children.get(component)?.clone();
	}
	Some(node)
}

/// Resolves `path` in every overlay in `allowed` (default: all), collecting
/// every hit (§4.4 `resolveMulti`).
pub fn resolve_multi(stack: &OverlayStack, path: &str, allowed: Option<&[usize]>) -> VfsResult<Vec<Hit>> {
	let ids: Vec<usize> = match allowed {
		Some(ids) => ids.to_vec(),
		None => stack.ids(),
	};
	let mut hits = Vec::new();
	for id in ids {
		let root = stack.root_of(id)?;
		if let Some(node) = traverse(&root, path) {
			hits.push(Hit { overlay_id: id, node });
		}
	}
	Ok(hits)
}

/// Resolves `path` in exactly one overlay, failing with `Conflict` if more
/// than one overlay contains it and `NotFound` if none do (§4.4 `resolve`).
pub fn resolve(stack: &OverlayStack, path: &str, allowed: Option<&[usize]>) -> VfsResult<Hit> {
	let mut hits = resolve_multi(stack, path, allowed)?;
	match hits.len() {
		0 => Err(VfsError::not_found(path)),
		1 => Ok(hits.remove(0)),
		_ => {
			let mut candidates = Vec::with_capacity(hits.len());
			for hit in &hits {
				candidates.push(stack.name_of(hit.overlay_id)?);
			}
			Err(VfsError::Conflict {
				path: path.to_string(),
				candidates,
			})
		}
	}
}

/// Resolves `path` in a single named overlay, failing if absent there
/// (§4.4 `resolveForOverlay`).
pub fn resolve_for_overlay(stack: &OverlayStack, path: &str, id: usize) -> VfsResult<ArcNode> {
	let root = stack.root_of(id)?;
	traverse(&root, path).ok_or_else(|| VfsError::not_found(path))
}

/// One directory-listing entry: the overlays that contribute a child under
/// this name, and which node kinds were observed (§4.4 `listDir`).
#[derive(Debug, Clone)]
pub struct ListEntry {
	pub overlays: Vec<usize>,
	pub kinds: Vec<NodeKind>,
}

impl ListEntry {
	/// The single-character type codes observed for this name; `'!'` is
	/// synthesized when more than one distinct kind was seen (§4.4).
	pub fn type_codes(&self) -> Vec<char> {
		let distinct: std::collections::HashSet<NodeKind> = self.kinds.iter().copied().collect();
		if distinct.len() > 1 {
			vec!['!']
		} else {
			let mut codes: Vec<char> = distinct.into_iter().map(NodeKind::code).collect();
			codes.sort_unstable();
			codes
		}
	}
}

/// Lists the union of children under `path` across `allowed` overlays,
/// recording which overlays and node kinds contributed each name (§4.4
/// `listDir`).
pub fn list_dir(stack: &OverlayStack, path: &str, allowed: Option<&[usize]>) -> VfsResult<BTreeMap<String, ListEntry>> {
	let hits = resolve_multi(stack, path, allowed)?;
	let mut out: BTreeMap<String, ListEntry> = BTreeMap::new();
	for hit in &hits {
		if !hit.node.is_directory() {
			continue;
		}
		for (name, child) in hit.node.children()? {
			let entry = out.entry(name).or_insert_with(|| ListEntry {
				overlays: Vec::new(),
				kinds: Vec::new(),
			});
			entry.overlays.push(hit.overlay_id);
			entry.kinds.push(child.kind());
		}
	}
	Ok(out)
}

/// The conflict policy (§3, §4.4) used to disambiguate when several
/// overlays contain the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
	#[default]
	Manual,
	Oldest,
	Newest,
}

impl ConflictPolicy {
	pub fn parse(s: &str) -> VfsResult<Self> {
		match s {
			"manual" => Ok(ConflictPolicy::Manual),
			"oldest" => Ok(ConflictPolicy::Oldest),
			"newest" => Ok(ConflictPolicy::Newest),
			other => Err(VfsError::usage(format!("unknown conflict policy `{other}` (expected manual|oldest|newest)"))),
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			ConflictPolicy::Manual => "manual",
			ConflictPolicy::Oldest => "oldest",
			ConflictPolicy::Newest => "newest",
		}
	}
}

/// Selects the primary overlay among `candidates` for the given `cwd`
/// according to `policy` (§4.4 `select_overlay`). `primary` is the session's
/// last-known primary overlay id, consulted only by `Manual`.
pub fn select_overlay(policy: ConflictPolicy, candidates: &[usize], primary: usize) -> VfsResult<usize> {
	if candidates.is_empty() {
		return Err(VfsError::not_found("no overlay intersects this directory"));
	}
	match policy {
		ConflictPolicy::Manual => {
			if candidates.contains(&primary) {
				Ok(primary)
			} else {
				Err(VfsError::Conflict {
					path: "<cwd>".to_string(),
					candidates: candidates.iter().map(|id| id.to_string()).collect(),
				})
			}
		}
		ConflictPolicy::Oldest => Ok(*candidates.iter().min().expect("non-empty")),
		ConflictPolicy::Newest => Ok(*candidates.iter().max().expect("non-empty")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::file::FileNode;
	use crate::node::{unparented, Node};

	fn stack_with_conflicting_file() -> OverlayStack {
		let stack = OverlayStack::new();
		let alt = stack.register("alt").unwrap();
		let base_root = stack.root_of(0).unwrap();
		let dir = base_root.downcast_ref::<crate::node::directory::DirectoryNode>().unwrap();
		let a = crate::node::directory::DirectoryNode::new_arc("a", unparented());
		dir.insert("a", a.clone()).unwrap();
		a.downcast_ref::<crate::node::directory::DirectoryNode>()
			.unwrap()
			.insert("x", FileNode::with_contents("x", unparented(), b"1".to_vec()))
			.unwrap();

		let alt_root = stack.root_of(alt).unwrap();
		let alt_dir = alt_root.downcast_ref::<crate::node::directory::DirectoryNode>().unwrap();
		let alt_a = crate::node::directory::DirectoryNode::new_arc("a", unparented());
		alt_dir.insert("a", alt_a.clone()).unwrap();
		alt_a
			.downcast_ref::<crate::node::directory::DirectoryNode>()
			.unwrap()
			.insert("x", FileNode::with_contents("x", unparented(), b"2".to_vec()))
			.unwrap();
		stack
	}

	#[test]
	fn resolve_multi_counts_hits() {
		let stack = stack_with_conflicting_file();
		let hits = resolve_multi(&stack, "/a/x", None).unwrap();
		assert_eq!(hits.len(), 2);
	}

	#[test]
	fn resolve_fails_with_conflict_when_ambiguous() {
		let stack = stack_with_conflicting_file();
		let err = resolve(&stack, "/a/x", None).unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
	}

	#[test]
	fn resolve_for_overlay_is_unambiguous() {
		let stack = stack_with_conflicting_file();
		let node = resolve_for_overlay(&stack, "/a/x", 0).unwrap();
		assert_eq!(node.read().unwrap(), b"1");
		let node = resolve_for_overlay(&stack, "/a/x", 1).unwrap();
		assert_eq!(node.read().unwrap(), b"2");
	}

	#[test]
	fn select_overlay_policies() {
		assert_eq!(select_overlay(ConflictPolicy::Oldest, &[0, 1, 2], 1).unwrap(), 0);
		assert_eq!(select_overlay(ConflictPolicy::Newest, &[0, 1, 2], 1).unwrap(), 2);
		assert_eq!(select_overlay(ConflictPolicy::Manual, &[0, 2], 2).unwrap(), 2);
		assert!(select_overlay(ConflictPolicy::Manual, &[0, 2], 1).is_err());
	}

	#[test]
	fn list_dir_marks_type_conflicts() {
		let stack = OverlayStack::new();
		let alt = stack.register("alt").unwrap();
		let base_root = stack.root_of(0).unwrap();
		base_root
			.downcast_ref::<crate::node::directory::DirectoryNode>()
			.unwrap()
			.insert("x", FileNode::with_contents("x", unparented(), Vec::new()))
			.unwrap();
		let alt_root = stack.root_of(alt).unwrap();
		alt_root
			.downcast_ref::<crate::node::directory::DirectoryNode>()
			.unwrap()
			.insert("x", crate::node::directory::DirectoryNode::new_arc("x", unparented()))
			.unwrap();
		let listing = list_dir(&stack, "/", None).unwrap();
		assert_eq!(listing["x"].type_codes(), vec!['!']);
	}
}
