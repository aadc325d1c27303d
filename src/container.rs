//! The overlay container format v3 (§4.7): a line-framed binary-in-text
//! encoding with a two-phase reader that reconstructs AST cross-references
//! by path. Uses `sha2`/`hex` (carried from the ambient stack, §6) for the
//! v3 source-file hash line.

use crate::ast::{AstNode, AstValue};
use crate::error::{VfsError, VfsResult};
use crate::node::directory::DirectoryNode;
use crate::node::file::FileNode;
use crate::node::{unparented, ArcNode, Node};
use crate::overlay::OverlayStack;
use crate::path;
use chrono::Local;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CURRENT_VERSION: u32 = 3;

/// A deferred child-attachment action queued during the structural pass and
/// executed in FIFO order during the fixup pass (§4.7 "Fixup"). Modeled as
/// a tagged record rather than a closure so it stays plain data, per §9's
/// note for languages without convenient closures-over-maps.
struct Fixup {
	/// Path of the AST node that owns the reference.
	referring_path: String,
	/// Path → child-name pairs this node's value expects to find once
	/// nodes are resolved.
	child_name: String,
}

/// Computes the sha256 hash of a source file's bytes, hex-encoded, for the
/// v3 `H` line.
pub fn hash_file(path: &Path) -> VfsResult<String> {
	let bytes = std::fs::read(path).map_err(VfsError::from)?;
	let mut hasher = Sha256::new();
	hasher.update(&bytes);
	Ok(hex::encode(hasher.finalize()))
}

// --- writer --------------------------------------------------------------

/// Serializes `root` (an overlay's root directory) to the v3 container
/// format. `source_path`, when given, populates the optional `H` line with
/// a hash of the serialized body itself — recomputing that hash on a later
/// load and comparing is how a verifying reader notices the file changed
/// on disk out from under the shell (§4.7's "Verifying side must warn but
/// not fail"). Pass `None` for a snapshot with no bound source (e.g. the
/// recovery snapshot, §4.9), which omits the `H` line entirely.
pub fn write_overlay(root: &ArcNode, source_path: Option<&str>) -> Vec<u8> {
	let mut body = Vec::new();
	write_node(&mut body, "/", root);

	let mut out = Vec::new();
	out.extend_from_slice(format!("# codex-vfs-overlay {CURRENT_VERSION}\n").as_bytes());
	if let Some(path) = source_path {
		let mut hasher = Sha256::new();
		hasher.update(&body);
		let hash = hex::encode(hasher.finalize());
		out.extend_from_slice(format!("H {path} {hash}\n").as_bytes());
	}
	out.extend_from_slice(&body);
	out
}

fn write_node(out: &mut Vec<u8>, path: &str, node: &ArcNode) {
	if node.is_directory() {
		out.extend_from_slice(format!("D {path}\n").as_bytes());
	} else if let Ok(ast) = node.downcast_ref::<AstNode>() {
		let value = ast.value();
		let payload = value.encode();
		out.extend_from_slice(format!("A {path} {} {}\n", value.type_tag(), payload.len()).as_bytes());
		out.extend_from_slice(&payload);
		out.push(b'\n');
	} else {
		let bytes = node.read().unwrap_or_default();
		out.extend_from_slice(format!("F {path} {}\n", bytes.len()).as_bytes());
		out.extend_from_slice(&bytes);
		out.push(b'\n');
	}
	// Recurse generically into every node's children, directory or AST:
	// the AST's own payload carries only scalar fields and child *names*
	// (§4.8), never a serialized subtree, so each child still needs its
	// own record. This is what makes function/body nodes "independently
	// resident in the directory tree" per §4.7's writer-ordering note.
	if let Ok(children) = node.children() {
		for (name, child) in children {
			let child_path = if path == "/" {
				format!("/{name}")
			} else {
				format!("{path}/{name}")
			};
			write_node(out, &child_path, &child);
		}
	}
}

/// Stages a timestamped backup of `destination` (if it exists) into a
/// `.vfsh` sibling directory before any write (§4.7: "The writer first
/// creates a timestamped backup of any existing destination... then writes
/// atomically").
pub fn backup_then_write(destination: &Path, bytes: &[u8]) -> VfsResult<()> {
	if destination.exists() {
		let parent = destination.parent().unwrap_or_else(|| Path::new("."));
		let backup_dir = parent.join(".vfsh");
		std::fs::create_dir_all(&backup_dir).map_err(VfsError::from)?;
		let stamp = Local::now().format("%Y-%m-%d-%H%M%S");
		let file_name = destination.file_name().and_then(|n| n.to_str()).unwrap_or("overlay");
		let backup_path = backup_dir.join(format!("{file_name}.{stamp}.bak"));
		std::fs::copy(destination, backup_path).map_err(VfsError::from)?;
	}
	let tmp = destination.with_extension("tmp-write");
	std::fs::write(&tmp, bytes).map_err(VfsError::from)?;
	std::fs::rename(&tmp, destination).map_err(VfsError::from)?;
	Ok(())
}

// --- reader ----------------------------------------------------------------

struct Cursor<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	fn new(buf: &'a [u8]) -> Self {
		Cursor { buf, pos: 0 }
	}

	fn offset(&self) -> usize {
		self.pos
	}

	fn eof(&self) -> bool {
		self.pos >= self.buf.len()
	}

	/// Reads one line (up to but excluding the terminator), accepting both
	/// `\n` and `\r\n` (§4.7 "Readers must accept both... terminators").
	fn read_line(&mut self) -> VfsResult<String> {
		let start = self.pos;
		let rel_newline = self.buf[start..]
			.iter()
			.position(|&b| b == b'\n')
			.ok_or_else(|| VfsError::format(format!("unterminated line at offset {start}")))?;
		let mut end = start + rel_newline;
		self.pos = end + 1;
		if end > start && self.buf[end - 1] == b'\r' {
			end -= 1;
		}
		String::from_utf8(self.buf[start..end].to_vec())
			.map_err(|e| VfsError::format(format!("non-utf8 record line at offset {start}: {e}")))
	}

	/// Reads exactly `n` bytes of raw content, then consumes the
	/// terminator following it (§4.7: "the trailing newline is not part
	/// of content").
	fn read_payload(&mut self, n: usize) -> VfsResult<Vec<u8>> {
		if self.pos + n > self.buf.len() {
			return Err(VfsError::format(format!(
				"truncated record payload at offset {} (wanted {n} bytes, {} remain)",
				self.pos,
				self.buf.len() - self.pos
			)));
		}
		let payload = self.buf[self.pos..self.pos + n].to_vec();
		self.pos += n;
		if self.eof() {
			return Err(VfsError::format(format!("missing record terminator at offset {}", self.pos)));
		}
		if self.buf[self.pos] == b'\r' {
			self.pos += 1;
		}
		if self.pos >= self.buf.len() || self.buf[self.pos] != b'\n' {
			return Err(VfsError::format(format!("missing record terminator at offset {}", self.pos)));
		}
		self.pos += 1;
		Ok(payload)
	}
}

fn validate_absolute_no_dotdot(path: &str, offset: usize) -> VfsResult<()> {
	if !path.starts_with('/') {
		return Err(VfsError::format(format!("record path `{path}` is not absolute (offset {offset})")));
	}
	if path::split(path).iter().any(|c| *c == "..") {
		return Err(VfsError::format(format!("record path `{path}` contains `..` (offset {offset})")));
	}
	Ok(())
}

/// Attaches `child` under `name` into `parent`'s children map, whichever
/// concrete node kind `parent` is. Directories hold their own
/// `BTreeMap`-backed map via [`DirectoryNode::replace`]; AST nodes that
/// expose structural children (translation units, functions, compound
/// blocks, range-for) hold theirs via [`AstNode::attach_existing_child`] —
/// both are "a local map whose contents are also child nodes in every
/// overlay-visible sense" per §4.2, so a path like `/tu/main` attaches the
/// same way regardless of whether `/tu` is a plain directory or an AST
/// node.
fn attach_child_generic(parent: &ArcNode, name: &str, child: ArcNode) -> VfsResult<()> {
	if let Ok(dir) = parent.downcast_ref::<DirectoryNode>() {
		dir.replace(name, child);
		return Ok(());
	}
	if let Ok(ast) = parent.downcast_ref::<AstNode>() {
		ast.attach_existing_child(name, child);
		return Ok(());
	}
	Err(VfsError::format(format!("`{}` cannot hold children", parent.name())))
}

/// Ensures every directory along `path` exists under `root`, creating
/// plain `DirectoryNode`s only where no node (of any kind) already
/// occupies that name, and returns the final node.
fn ensure_parent_dirs(path_to_node: &mut BTreeMap<String, ArcNode>, root: &ArcNode, path: &str) -> VfsResult<ArcNode> {
	let mut node = root.clone();
	let mut current = String::new();
	for component in path::split(path) {
		current = if current.is_empty() {
			format!("/{component}")
		} else {
			format!("{current}/{component}")
		};
		let existing = node.children()?.get(component).cloned();
		node = match existing {
			Some(existing) => existing,
			None => {
				let child = DirectoryNode::new_arc(component, Arc::downgrade(&node));
				attach_child_generic(&node, component, child.clone())?;
				child
			}
		};
		path_to_node.insert(current.clone(), node.clone());
	}
	Ok(node)
}

fn attach(path_to_node: &mut BTreeMap<String, ArcNode>, root: &ArcNode, path: &str, node: ArcNode) -> VfsResult<()> {
	let parent_path = path::dirname(path);
	let name = path::basename(path);
	let parent = if path::split(path).len() <= 1 {
		root.clone()
	} else {
		ensure_parent_dirs(path_to_node, root, &parent_path)?
	};
	node.set_parent(Arc::downgrade(&parent));
	node.set_name(name.to_string());
	attach_child_generic(&parent, name, node.clone())?;
	path_to_node.insert(path.to_string(), node);
	Ok(())
}

/// Parses a v1/v2/v3 container into a fresh overlay root (§4.7 "Reader
/// algorithm (two phases)"). Returns the root node and, if a `H` line was
/// present, the `(source_path, recorded_hash)` pair for the caller to
/// verify (verification itself only warns, per spec, so it is left to the
/// caller rather than failing here).
pub fn read_overlay(bytes: &[u8]) -> VfsResult<(ArcNode, Option<(String, String)>)> {
	let mut cursor = Cursor::new(bytes);
	let header = cursor.read_line()?;
	let version: u32 = header
		.strip_prefix("# codex-vfs-overlay ")
		.and_then(|v| v.trim().parse().ok())
		.ok_or_else(|| VfsError::format(format!("unrecognized container header: {header:?}")))?;
	if !(1..=3).contains(&version) {
		return Err(VfsError::format(format!("unsupported container version {version}")));
	}

	let root: ArcNode = DirectoryNode::new_arc("/", unparented());
	let mut path_to_node: BTreeMap<String, ArcNode> = BTreeMap::new();
	path_to_node.insert("/".to_string(), root.clone());

	// The optional `H` line (v3) immediately follows the header, before
	// any D/F/A record (§4.7).
	let mut hash_line: Option<(String, String)> = None;
	if !cursor.eof() {
		let save = cursor.pos;
		let peek = cursor.read_line()?;
		if let Some(rest) = peek.strip_prefix("H ") {
			let mut rest_parts = rest.splitn(2, ' ');
			let source_path = rest_parts.next().unwrap_or("").to_string();
			let hash = rest_parts.next().unwrap_or("").to_string();
			hash_line = Some((source_path, hash));
		} else {
			cursor.pos = save;
		}
	}
	let body_start = cursor.pos;

	let mut fixups: Vec<Fixup> = Vec::new();

	loop {
		if cursor.eof() {
			break;
		}
		let offset = cursor.offset();
		let line = cursor.read_line()?;
		if line.is_empty() {
			continue;
		}
		let mut parts = line.splitn(2, ' ');
		let tag = parts.next().unwrap_or("");
		let rest = parts.next().unwrap_or("");
		match tag {
			"D" => {
				let path = rest.trim().to_string();
				validate_absolute_no_dotdot(&path, offset)?;
				if path == "/" {
					continue;
				}
				ensure_parent_dirs(&mut path_to_node, &root, &path)?;
			}
			"F" => {
				let mut rest_parts = rest.rsplitn(2, ' ');
				let size_str = rest_parts.next().unwrap_or("");
				let path = rest_parts.next().unwrap_or("").to_string();
				validate_absolute_no_dotdot(&path, offset)?;
				let size: usize = size_str
					.parse()
					.map_err(|_| VfsError::format(format!("invalid file size `{size_str}` at offset {offset}")))?;
				let content = cursor.read_payload(size)?;
				let node = FileNode::with_contents(path::basename(&path), unparented(), content);
				attach(&mut path_to_node, &root, &path, node)?;
			}
			"A" => {
				let mut tokens: Vec<&str> = rest.split(' ').collect();
				if tokens.len() < 3 {
					return Err(VfsError::format(format!("malformed AST record at offset {offset}: {line:?}")));
				}
				let size_str = tokens.pop().unwrap();
				let type_tag = tokens.pop().unwrap().to_string();
				let path = tokens.join(" ");
				validate_absolute_no_dotdot(&path, offset)?;
				let size: usize = size_str
					.parse()
					.map_err(|_| VfsError::format(format!("invalid AST payload size `{size_str}` at offset {offset}")))?;
				if size == 0 {
					return Err(VfsError::format(format!(
						"zero-byte AST payload is not permitted (offset {offset}, path `{path}`)"
					)));
				}
				let payload = cursor.read_payload(size)?;
				let value = AstValue::decode(&type_tag, &payload)?;
				for child_name in value.expected_child_names() {
					fixups.push(Fixup {
						referring_path: path.clone(),
						child_name,
					});
				}
				let node: ArcNode = AstNode::new_arc(path::basename(&path), unparented(), value);
				attach(&mut path_to_node, &root, &path, node)?;
			}
			other => {
				return Err(VfsError::format(format!("unknown record tag `{other}` at offset {offset}")));
			}
		}
	}

	// Fixup pass (§4.7 phase 2): executed in FIFO order, each looking up
	// one or more absolute paths in the path→node map.
	for fixup in fixups {
		let referring = path_to_node
			.get(&fixup.referring_path)
			.ok_or_else(|| VfsError::format(format!("fixup source `{}` missing", fixup.referring_path)))?
			.clone();
		let ast = referring
			.downcast_ref::<AstNode>()
			.map_err(|_| VfsError::format(format!("fixup source `{}` is not an AST node", fixup.referring_path)))?;
		let child_path = format!("{}/{}", fixup.referring_path, fixup.child_name);
		let child = path_to_node.get(&child_path).ok_or_else(|| {
			VfsError::format(format!(
				"missing fixup target `{child_path}` referenced by `{}`",
				fixup.referring_path
			))
		})?;
		ast.attach_existing_child(fixup.child_name.clone(), child.clone());
	}

	if let Some((_, recorded_hash)) = &hash_line {
		let mut hasher = Sha256::new();
		hasher.update(&bytes[body_start..]);
		let actual_hash = hex::encode(hasher.finalize());
		if &actual_hash != recorded_hash {
			log::warn!(
				"container body hash does not match its recorded `H` line (expected {recorded_hash}, got {actual_hash}); loading anyway"
			);
		}
	}

	Ok((root, hash_line))
}

/// Loads a container file from disk into the overlay stack under a new
/// overlay named `name`, binding its source path and whole-file hash (the
/// baseline `save_overlay` later compares against to notice an out-of-band
/// edit — distinct from the `H` line's own body hash, which `read_overlay`
/// already checked against itself above). Returns the new overlay id.
pub fn load_into_stack(stack: &OverlayStack, name: &str, source_path: &Path) -> VfsResult<usize> {
	let bytes = std::fs::read(source_path).map_err(VfsError::from)?;
	let (root, _hash_line) = read_overlay(&bytes)?;
	let id = stack.register_with_root(name, root)?;
	stack.set_source(id, Some(source_path.to_string_lossy().into_owned()))?;
	stack.set_source_hash(id, Some(hash_file(source_path)?))?;
	Ok(id)
}

/// Writes overlay `id` to its bound source file (or to `fallback_path` if
/// it has none yet), verifying the on-disk hash first and warning (not
/// failing) on mismatch (§4.7 "Verifying side must warn but not fail").
pub fn save_overlay(stack: &OverlayStack, id: usize, fallback_path: Option<&Path>) -> VfsResult<PathBuf> {
	let source = stack.source(id)?;
	let destination: PathBuf = match source.clone().map(PathBuf::from).or_else(|| fallback_path.map(Path::to_path_buf)) {
		Some(p) => p,
		None => return Err(VfsError::external("overlay has no bound source file to save to")),
	};
	if let Some(recorded_hash) = stack.source_hash(id)? {
		if destination.exists() {
			if let Ok(current_hash) = hash_file(&destination) {
				if current_hash != recorded_hash {
					log::warn!(
						"source file `{}` changed on disk since it was loaded (hash mismatch); saving anyway",
						destination.display()
					);
				}
			}
		}
	}
	let root = stack.root_of(id)?;
	let destination_str = destination.to_string_lossy().into_owned();
	let bytes = write_overlay(&root, Some(destination_str.as_str()));
	backup_then_write(&destination, &bytes)?;
	stack.set_source(id, Some(destination.to_string_lossy().into_owned()))?;
	stack.set_source_hash(id, Some(hash_file(&destination)?))?;
	Ok(destination)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vfs::Vfs;

	#[test]
	fn empty_file_roundtrips() {
		let vfs = Vfs::new();
		vfs.touch("/x", 0).unwrap();
		let root = vfs.overlays.root_of(0).unwrap();
		let bytes = write_overlay(&root, None);
		let (read_root, _) = read_overlay(&bytes).unwrap();
		let file = crate::resolver::traverse(&read_root, "/x").unwrap();
		assert_eq!(file.read().unwrap(), Vec::<u8>::new());
	}

	#[test]
	fn zero_byte_ast_payload_is_rejected() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(b"# codex-vfs-overlay 3\n");
		bytes.extend_from_slice(b"A /x sexpr 0\n\n");
		assert!(read_overlay(&bytes).is_err());
	}

	#[test]
	fn unknown_record_tag_is_format_error() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(b"# codex-vfs-overlay 3\n");
		bytes.extend_from_slice(b"Z /x\n");
		let err = read_overlay(&bytes).unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::Format);
	}

	#[test]
	fn accepts_crlf_terminators() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(b"# codex-vfs-overlay 3\r\n");
		bytes.extend_from_slice(b"F /x 2\r\nhi\r\n");
		let (root, _) = read_overlay(&bytes).unwrap();
		let file = crate::resolver::traverse(&root, "/x").unwrap();
		assert_eq!(file.read().unwrap(), b"hi");
	}

	#[test]
	fn container_roundtrip_directory_and_file() {
		let vfs = Vfs::new();
		vfs.write("/a/b", b"hello", 0).unwrap();
		let root = vfs.overlays.root_of(0).unwrap();
		let bytes = write_overlay(&root, None);
		let (read_root, _) = read_overlay(&bytes).unwrap();
		let node = crate::resolver::traverse(&read_root, "/a/b").unwrap();
		assert_eq!(node.read().unwrap(), b"hello");
	}

	#[test]
	fn container_roundtrip_ast_with_fixup() {
		use crate::ast::cpp;
		let vfs = Vfs::new();
		let tu = AstNode::new_arc(
			"tu",
			unparented(),
			AstValue::Cpp(cpp::CppNode::TranslationUnit(cpp::TranslationUnit {
				includes: vec![cpp::Include { header: "iostream".into(), angled: true }],
				function_names: vec!["main".into()],
			})),
		);
		vfs.add_node("/", "tu", tu, 0).unwrap();
		let function: ArcNode = AstNode::new_arc(
			"main",
			unparented(),
			AstValue::Cpp(cpp::CppNode::Function(cpp::Function {
				return_type: "int".into(),
				name: "main".into(),
				params: vec![],
				body_child_name: "body".into(),
			})),
		);
		vfs.add_node("/tu", "main", function, 0).unwrap();
		let body: ArcNode = AstNode::new_arc(
			"body",
			unparented(),
			AstValue::Cpp(cpp::CppNode::CompoundBlock(cpp::CompoundBlock {
				statements: vec![cpp::Stmt::Return(cpp::Expr::IntegerLiteral(0))],
			})),
		);
		vfs.add_node("/tu/main", "body", body, 0).unwrap();

		let root = vfs.overlays.root_of(0).unwrap();
		let bytes = write_overlay(&root, None);
		let (read_root, _) = read_overlay(&bytes).unwrap();
		let tu_node = crate::resolver::traverse(&read_root, "/tu").unwrap();
		let tu_ast = tu_node.downcast_ref::<AstNode>().unwrap();
		let text = tu_ast.to_text().unwrap();
		assert!(text.contains("int main() {"));
		assert!(text.contains("return 0;"));
	}
}
