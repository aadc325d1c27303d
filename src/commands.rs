//! The built-in command set (§4.10 "Command contracts") and the [`Shell`]
//! that hosts it. Grounded on [`pipeline`]'s `CommandHost` seam: every
//! command here is a plain function over `&Shell`, preferring free
//! functions over a command-object hierarchy — each node kind is a struct
//! plus an `impl Node`, not a class tree with virtual dispatch beyond the
//! one `Node` trait.

use crate::ast::{cpp, planner, sexpr, AstNode, AstValue};
use crate::autosave::AutosaveEngine;
use crate::container;
use crate::error::{VfsError, VfsResult};
use crate::node::mount::{FilesystemMountNode, LibraryMountNode, RemoteMountNode};
use crate::node::{unparented, ArcNode};
use crate::pipeline::{CommandHost, CommandOutcome};
use crate::resolver::ConflictPolicy;
use crate::vfs::Vfs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// The session state every built-in command reads or mutates: the VFS
/// itself, line history for the `history` command, and an optional handle
/// to the autosave worker so overlay/autosave controls can reach it.
pub struct Shell {
	pub vfs: Arc<Vfs>,
	pub history: Mutex<Vec<String>>,
	pub autosave: Mutex<Option<Arc<AutosaveEngine>>>,
}

impl Shell {
	pub fn new() -> Self {
		Shell {
			vfs: Arc::new(Vfs::new()),
			history: Mutex::new(Vec::new()),
			autosave: Mutex::new(None),
		}
	}

	/// A second handle to the same VFS, for handing to an
	/// [`AutosaveEngine`] that the shell doesn't otherwise own.
	pub fn vfs_handle(&self) -> Arc<Vfs> {
		Arc::clone(&self.vfs)
	}

	pub fn set_autosave(&self, engine: Arc<AutosaveEngine>) {
		*self.autosave.lock().expect("poisoned lock") = Some(engine);
	}

	pub fn record_history(&self, line: &str) {
		self.history.lock().expect("poisoned lock").push(line.to_string());
	}

	fn note_modification(&self) {
		if let Some(engine) = self.autosave.lock().expect("poisoned lock").as_ref() {
			engine.note_modification();
		}
	}

	fn primary(&self) -> usize {
		self.vfs.cwd.primary()
	}
}

impl Default for Shell {
	fn default() -> Self {
		Self::new()
	}
}

impl CommandHost for Shell {
	fn run(&self, name: &str, args: &[String], stdin: &str) -> CommandOutcome {
		let result = dispatch(self, name, args, stdin);
		match result {
			Ok(outcome) => outcome,
			Err(e) => CommandOutcome::err(e.diagnostic()),
		}
	}

	fn write_redirect(&self, path: &str, bytes: &[u8], append: bool) -> VfsResult<()> {
		let full = self.vfs.normalize(path);
		let id = self.primary();
		if append {
			let mut existing = self.vfs.read(&full, Some(id)).unwrap_or_default();
			existing.extend_from_slice(bytes);
			self.vfs.write(&full, &existing, id)?;
		} else {
			self.vfs.write(&full, bytes, id)?;
		}
		self.note_modification();
		Ok(())
	}
}

/// Looks up and runs one built-in by name. A command not in this set is
/// shelled out to the host (§5 "External-command keepalive") rather than
/// rejected outright, matching the original's `exec_capture` fallback.
fn dispatch(shell: &Shell, name: &str, args: &[String], stdin: &str) -> VfsResult<CommandOutcome> {
	match name {
		"pwd" => Ok(CommandOutcome::ok(shell.vfs.cwd.path())),
		"cd" => cmd_cd(shell, args),
		"ls" => cmd_ls(shell, args),
		"tree" => cmd_tree(shell, args),
		"mkdir" => cmd_mkdir(shell, args),
		"touch" => cmd_touch(shell, args),
		"rm" => cmd_rm(shell, args),
		"mv" => cmd_mv(shell, args),
		"link" => cmd_link(shell, args),
		"cat" => cmd_cat(shell, args, stdin),
		"echo" => Ok(CommandOutcome::ok(args.join(" "))),
		"grep" => cmd_grep(shell, args, stdin),
		"head" => cmd_head(args, stdin),
		"tail" => cmd_tail(args, stdin),
		"uniq" => Ok(CommandOutcome::ok(cmd_uniq(stdin))),
		"count" => cmd_count(shell, args, stdin),
		"history" => cmd_history(shell, args),
		"true" => Ok(CommandOutcome::ok("")),
		"false" => Ok(CommandOutcome::err("")),
		"overlay" => cmd_overlay(shell, args),
		"mount" => cmd_mount(shell, args),
		"unmount" => cmd_unmount(shell, args),
		"autosave" => cmd_autosave(shell, args),
		"sexpr" => cmd_sexpr(shell, args),
		"cpp" => cmd_cpp(shell, args),
		"planner" => cmd_planner(shell, args),
		other => cmd_external(other, args),
	}
}

/// Shells out to the host for any name outside the built-in set (§5, §4.10).
/// The built-in-or-host dispatch mirrors a shell's own `$PATH` fallback, not
/// a VFS operation, so it never touches overlay state or the dirty clock.
fn cmd_external(name: &str, args: &[String]) -> VfsResult<CommandOutcome> {
	let mut command = name.to_string();
	for a in args {
		command.push(' ');
		command.push_str(a);
	}
	match crate::exec::exec_capture(&command, name) {
		Ok(out) => Ok(CommandOutcome::ok(out)),
		Err(e) => Ok(CommandOutcome::err(e.diagnostic())),
	}
}

fn arg(args: &[String], i: usize, what: &str) -> VfsResult<String> {
	args.get(i).cloned().ok_or_else(|| VfsError::usage(format!("missing {what}")))
}

// --- navigation & listing --------------------------------------------------

fn cmd_cd(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let target = args.first().map(String::as_str).unwrap_or("/");
	shell.vfs.chdir(target)?;
	Ok(CommandOutcome::ok(""))
}

fn cmd_ls(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = args.first().map(|a| shell.vfs.normalize(a)).unwrap_or_else(|| shell.vfs.cwd.path());
	let listing = shell.vfs.list_dir(&path, None)?;
	let mut lines = Vec::new();
	for (name, entry) in listing {
		let codes: String = entry.type_codes().into_iter().collect();
		lines.push(format!("{codes}\t{name}"));
	}
	Ok(CommandOutcome::ok(lines.join("\n")))
}

fn cmd_tree(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let start = args.first().map(|a| shell.vfs.normalize(a)).unwrap_or_else(|| shell.vfs.cwd.path());
	let mut lines = Vec::new();
	tree_walk(shell, &start, 0, &mut lines)?;
	Ok(CommandOutcome::ok(lines.join("\n")))
}

fn tree_walk(shell: &Shell, path: &str, depth: usize, lines: &mut Vec<String>) -> VfsResult<()> {
	let listing = shell.vfs.list_dir(path, None)?;
	for (name, entry) in listing {
		let codes: String = entry.type_codes().into_iter().collect();
		lines.push(format!("{}{codes}\t{name}", "  ".repeat(depth)));
		if codes == "d" || codes == "a" {
			let child_path = if path == "/" { format!("/{name}") } else { format!("{path}/{name}") };
			tree_walk(shell, &child_path, depth + 1, lines)?;
		}
	}
	Ok(())
}

// --- mutation ---------------------------------------------------------------

fn cmd_mkdir(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = shell.vfs.normalize(&arg(args, 0, "path")?);
	shell.vfs.mkdir(&path, shell.primary())?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

fn cmd_touch(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = shell.vfs.normalize(&arg(args, 0, "path")?);
	shell.vfs.touch(&path, shell.primary())?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

fn cmd_rm(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = shell.vfs.normalize(&arg(args, 0, "path")?);
	shell.vfs.rm(&path, shell.primary())?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

fn cmd_mv(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let src = shell.vfs.normalize(&arg(args, 0, "source path")?);
	let dst = shell.vfs.normalize(&arg(args, 1, "destination path")?);
	shell.vfs.mv(&src, &dst, shell.primary())?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

fn cmd_link(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let src = shell.vfs.normalize(&arg(args, 0, "source path")?);
	let dst = shell.vfs.normalize(&arg(args, 1, "destination path")?);
	shell.vfs.link(&src, &dst, shell.primary())?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

// --- text filters -------------------------------------------------------

fn cmd_cat(shell: &Shell, args: &[String], stdin: &str) -> VfsResult<CommandOutcome> {
	if args.is_empty() {
		return Ok(CommandOutcome::ok(stdin));
	}
	let mut out = String::new();
	for path in args {
		let full = shell.vfs.normalize(path);
		let bytes = shell.vfs.read(&full, None)?;
		out.push_str(&String::from_utf8_lossy(&bytes));
	}
	Ok(CommandOutcome::ok(out))
}

fn cmd_grep(shell: &Shell, args: &[String], stdin: &str) -> VfsResult<CommandOutcome> {
	let mut args = args.to_vec();
	let case_insensitive = if args.first().map(String::as_str) == Some("-i") {
		args.remove(0);
		true
	} else {
		false
	};
	let pattern = arg(&args, 0, "pattern")?;
	let text = if let Some(path) = args.get(1) {
		let full = shell.vfs.normalize(path);
		String::from_utf8_lossy(&shell.vfs.read(&full, None)?).into_owned()
	} else {
		stdin.to_string()
	};
	let needle = if case_insensitive { pattern.to_lowercase() } else { pattern.clone() };
	let matches: Vec<&str> = text
		.lines()
		.filter(|line| {
			let haystack = if case_insensitive { line.to_lowercase() } else { line.to_string() };
			haystack.contains(&needle)
		})
		.collect();
	if matches.is_empty() {
		return Ok(CommandOutcome::err(""));
	}
	Ok(CommandOutcome::ok(matches.join("\n")))
}

fn cmd_head(args: &[String], stdin: &str) -> VfsResult<CommandOutcome> {
	let n = parse_dash_n(args)?;
	Ok(CommandOutcome::ok(stdin.lines().take(n).collect::<Vec<_>>().join("\n")))
}

fn cmd_tail(args: &[String], stdin: &str) -> VfsResult<CommandOutcome> {
	let n = parse_dash_n(args)?;
	let lines: Vec<&str> = stdin.lines().collect();
	let start = lines.len().saturating_sub(n);
	Ok(CommandOutcome::ok(lines[start..].join("\n")))
}

fn parse_dash_n(args: &[String]) -> VfsResult<usize> {
	if args.first().map(String::as_str) != Some("-n") {
		return Err(VfsError::usage("expected `-n N`".to_string()));
	}
	arg(args, 1, "line count")?
		.parse()
		.map_err(|_| VfsError::usage("line count must be a non-negative integer".to_string()))
}

fn cmd_uniq(stdin: &str) -> String {
	let mut out = Vec::new();
	let mut previous: Option<&str> = None;
	for line in stdin.lines() {
		if previous != Some(line) {
			out.push(line);
		}
		previous = Some(line);
	}
	out.join("\n")
}

fn cmd_count(shell: &Shell, args: &[String], stdin: &str) -> VfsResult<CommandOutcome> {
	let text = if let Some(path) = args.first() {
		let full = shell.vfs.normalize(path);
		String::from_utf8_lossy(&shell.vfs.read(&full, None)?).into_owned()
	} else {
		stdin.to_string()
	};
	Ok(CommandOutcome::ok(text.lines().count().to_string()))
}

fn cmd_history(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let history = shell.history.lock().expect("poisoned lock");
	let selected: Vec<String> = if args.first().map(String::as_str) == Some("-n") {
		let n: usize = arg(args, 1, "history count")?
			.parse()
			.map_err(|_| VfsError::usage("history count must be a non-negative integer".to_string()))?;
		let start = history.len().saturating_sub(n);
		history[start..].to_vec()
	} else {
		history.clone()
	};
	Ok(CommandOutcome::ok(selected.join("\n")))
}

// --- overlay / mount / autosave controls ------------------------------------

fn cmd_overlay(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	match arg(args, 0, "overlay subcommand (list|register|unregister|policy|load|save)")?.as_str() {
		"list" => {
			let mut lines = Vec::new();
			for id in shell.vfs.overlays.ids() {
				let name = shell.vfs.overlays.name_of(id)?;
				let dirty = shell.vfs.overlays.dirty(id)?;
				lines.push(format!("{id}\t{name}\t{}", if dirty { "dirty" } else { "clean" }));
			}
			Ok(CommandOutcome::ok(lines.join("\n")))
		}
		"register" => {
			let name = arg(args, 1, "overlay name")?;
			let id = shell.vfs.overlays.register(name)?;
			Ok(CommandOutcome::ok(id.to_string()))
		}
		"unregister" => {
			let id: usize = arg(args, 1, "overlay id")?.parse().map_err(|_| VfsError::usage("overlay id must be an integer".to_string()))?;
			shell.vfs.overlays.unregister(id)?;
			shell.vfs.recompute_primary()?;
			Ok(CommandOutcome::ok(""))
		}
		"policy" => {
			let policy = ConflictPolicy::parse(&arg(args, 1, "policy (manual|oldest|newest)")?)?;
			shell.vfs.set_policy(policy)?;
			Ok(CommandOutcome::ok(""))
		}
		"load" => {
			let name = arg(args, 1, "overlay name")?;
			let path = arg(args, 2, "source file path")?;
			let id = container::load_into_stack(&shell.vfs.overlays, &name, &PathBuf::from(path))?;
			Ok(CommandOutcome::ok(id.to_string()))
		}
		"save" => {
			let id: usize = arg(args, 1, "overlay id")?.parse().map_err(|_| VfsError::usage("overlay id must be an integer".to_string()))?;
			let fallback = args.get(2).map(PathBuf::from);
			let destination = container::save_overlay(&shell.vfs.overlays, id, fallback.as_deref())?;
			Ok(CommandOutcome::ok(destination.to_string_lossy().into_owned()))
		}
		other => Err(VfsError::usage(format!("unknown overlay subcommand `{other}`"))),
	}
}

fn cmd_mount(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let kind = arg(args, 0, "mount kind (fs|library|remote)")?;
	let vfs_path = shell.vfs.normalize(&arg(args, 1, "vfs path")?);
	let target = arg(args, 2, "mount target")?;
	let (dir_path, name) = {
		let dirname = crate::path::dirname(&vfs_path);
		(dirname, crate::path::basename(&vfs_path).to_string())
	};
	let id = shell.primary();
	let node: ArcNode = match kind.as_str() {
		"fs" => FilesystemMountNode::new_arc(&name, unparented(), PathBuf::from(target)),
		"library" => LibraryMountNode::new_arc(&name, unparented(), PathBuf::from(target))?,
		"remote" => RemoteMountNode::new_arc(&name, unparented(), target),
		other => return Err(VfsError::usage(format!("unknown mount kind `{other}`"))),
	};
	shell.vfs.add_node(&dir_path, &name, node, id)?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

fn cmd_unmount(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = shell.vfs.normalize(&arg(args, 0, "vfs path")?);
	shell.vfs.rm(&path, shell.primary())?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

fn cmd_autosave(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let engine = shell.autosave.lock().expect("poisoned lock").clone();
	match arg(args, 0, "autosave subcommand (on|off|status|save)")?.as_str() {
		"on" => {
			if let Some(engine) = &engine {
				engine.set_enabled(true);
			}
			Ok(CommandOutcome::ok(""))
		}
		"off" => {
			if let Some(engine) = &engine {
				engine.set_enabled(false);
			}
			Ok(CommandOutcome::ok(""))
		}
		"status" => {
			let enabled = engine.as_ref().map(|e| e.enabled()).unwrap_or(false);
			Ok(CommandOutcome::ok(if enabled { "enabled" } else { "disabled" }))
		}
		"save" => {
			let id: usize = arg(args, 1, "overlay id")?.parse().map_err(|_| VfsError::usage("overlay id must be an integer".to_string()))?;
			let engine = engine.ok_or_else(|| VfsError::external("autosave engine is not installed"))?;
			let destination = engine.force_save(id)?;
			Ok(CommandOutcome::ok(destination.to_string_lossy().into_owned()))
		}
		other => Err(VfsError::usage(format!("unknown autosave subcommand `{other}`"))),
	}
}

// --- s-expression / c++ builder bridges -------------------------------------

fn cmd_sexpr(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = shell.vfs.normalize(&arg(args, 0, "vfs path")?);
	let kind = arg(args, 1, "s-expression kind (int|bool|string|symbol)")?;
	let value = match kind.as_str() {
		"int" => sexpr::SExpr::Integer(
			arg(args, 2, "integer value")?
				.parse()
				.map_err(|_| VfsError::usage("expected an integer".to_string()))?,
		),
		"bool" => sexpr::SExpr::Boolean(arg(args, 2, "boolean value")? == "true"),
		"string" => sexpr::SExpr::Str(arg(args, 2, "string value")?),
		"symbol" => sexpr::SExpr::Symbol(arg(args, 2, "symbol name")?),
		other => return Err(VfsError::usage(format!("unknown s-expression kind `{other}`"))),
	};
	place_ast_node(shell, &path, AstValue::SExpr(value))
}

fn cmd_planner(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = shell.vfs.normalize(&arg(args, 0, "vfs path")?);
	let kind = arg(args, 1, "planner kind (root|sub_plan|strategy|notes|goals|ideas|deps|implemented|research)")?;
	let text = args[2.min(args.len())..].join(" ");
	let value = match kind.as_str() {
		"root" => planner::PlannerNode::Root(text),
		"sub_plan" => planner::PlannerNode::SubPlan(text),
		"strategy" => planner::PlannerNode::Strategy(text),
		"notes" => planner::PlannerNode::Notes(text),
		"goals" => planner::PlannerNode::Goals(split_lines(&text)),
		"ideas" => planner::PlannerNode::Ideas(split_lines(&text)),
		"deps" => planner::PlannerNode::Deps(split_lines(&text)),
		"implemented" => planner::PlannerNode::Implemented(split_lines(&text)),
		"research" => planner::PlannerNode::Research(split_lines(&text)),
		other => return Err(VfsError::usage(format!("unknown planner kind `{other}`"))),
	};
	place_ast_node(shell, &path, AstValue::Planner(value))
}

fn split_lines(text: &str) -> Vec<String> {
	text.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Builds a minimal translation-unit/function/body triple under `path`, the
/// common case a builder session starts from (§4.8 "C++ builder"). Richer
/// structural edits (additional statements, range-for loops) go through
/// `sexpr`/`planner`-style single-node placement once the tree exists,
/// since a line-oriented command cannot usefully describe an arbitrary
/// expression tree in one shot.
fn cmd_cpp(shell: &Shell, args: &[String]) -> VfsResult<CommandOutcome> {
	let path = shell.vfs.normalize(&arg(args, 0, "vfs path")?);
	match arg(args, 1, "c++ kind (main|raw_statement)")?.as_str() {
		"main" => {
			let id = shell.primary();
			let tu = AstNode::new_arc(
				crate::path::basename(&path),
				unparented(),
				AstValue::Cpp(cpp::CppNode::TranslationUnit(cpp::TranslationUnit {
					includes: vec![cpp::Include { header: "iostream".into(), angled: true }],
					function_names: vec!["main".into()],
				})),
			);
			shell.vfs.add_node(&crate::path::dirname(&path), crate::path::basename(&path), tu, id)?;
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
			shell.vfs.add_node(&path, "main", function, id)?;
			let body: ArcNode = AstNode::new_arc(
				"body",
				unparented(),
				AstValue::Cpp(cpp::CppNode::CompoundBlock(cpp::CompoundBlock {
					statements: vec![cpp::Stmt::Return(cpp::Expr::IntegerLiteral(0))],
				})),
			);
			shell.vfs.add_node(&format!("{path}/main"), "body", body, id)?;
			shell.note_modification();
			Ok(CommandOutcome::ok(""))
		}
		"raw_statement" => {
			let text = args[2.min(args.len())..].join(" ");
			place_ast_node(
				shell,
				&path,
				AstValue::Cpp(cpp::CppNode::CompoundBlock(cpp::CompoundBlock {
					statements: vec![cpp::Stmt::Raw(text)],
				})),
			)
		}
		other => Err(VfsError::usage(format!("unknown c++ kind `{other}`"))),
	}
}

fn place_ast_node(shell: &Shell, path: &str, value: AstValue) -> VfsResult<CommandOutcome> {
	let id = shell.primary();
	let dir_path = crate::path::dirname(path);
	let name = crate::path::basename(path);
	let node: ArcNode = AstNode::new_arc(name, unparented(), value);
	shell.vfs.add_node(&dir_path, name, node, id)?;
	shell.note_modification();
	Ok(CommandOutcome::ok(""))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pwd_cd_roundtrip() {
		let shell = Shell::new();
		shell.vfs.mkdir("/a/b", 0).unwrap();
		dispatch(&shell, "cd", &["/a/b".to_string()], "").unwrap();
		let out = dispatch(&shell, "pwd", &[], "").unwrap();
		assert_eq!(out.output, "/a/b");
	}

	#[test]
	fn mkdir_touch_cat() {
		let shell = Shell::new();
		dispatch(&shell, "mkdir", &["/a".to_string()], "").unwrap();
		shell.vfs.write("/a/f", b"hello\nworld", 0).unwrap();
		let out = dispatch(&shell, "cat", &["/a/f".to_string()], "").unwrap();
		assert_eq!(out.output, "hello\nworld");
	}

	#[test]
	fn grep_filters_and_reports_failure_on_no_match() {
		let out = cmd_grep(&Shell::new(), &["hello".to_string()], "hello world\ngoodbye").unwrap();
		assert!(out.success);
		assert_eq!(out.output, "hello world");
		let out = cmd_grep(&Shell::new(), &["nope".to_string()], "hello world").unwrap();
		assert!(!out.success);
		assert_eq!(out.output, "");
	}

	#[test]
	fn head_and_tail_slice_lines() {
		let stdin = "1\n2\n3\n4\n5";
		assert_eq!(cmd_head(&["-n".to_string(), "2".to_string()], stdin).unwrap().output, "1\n2");
		assert_eq!(cmd_tail(&["-n".to_string(), "2".to_string()], stdin).unwrap().output, "4\n5");
	}

	#[test]
	fn uniq_drops_consecutive_duplicates_only() {
		assert_eq!(cmd_uniq("a\na\nb\na"), "a\nb\na");
	}

	#[test]
	fn history_lists_recorded_lines() {
		let shell = Shell::new();
		shell.record_history("ls");
		shell.record_history("pwd");
		let out = dispatch(&shell, "history", &[], "").unwrap();
		assert_eq!(out.output, "ls\npwd");
		let out = dispatch(&shell, "history", &["-n".to_string(), "1".to_string()], "").unwrap();
		assert_eq!(out.output, "pwd");
	}

	#[test]
	fn overlay_register_and_list() {
		let shell = Shell::new();
		let out = dispatch(&shell, "overlay", &["register".to_string(), "alt".to_string()], "").unwrap();
		assert_eq!(out.output, "1");
		let out = dispatch(&shell, "overlay", &["list".to_string()], "").unwrap();
		assert!(out.output.contains("alt"));
	}

	#[test]
	fn mount_fs_attaches_filesystem_node() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
		let shell = Shell::new();
		dispatch(&shell, "mkdir", &["/host".to_string()], "").unwrap();
		dispatch(
			&shell,
			"mount",
			&["fs".to_string(), "/host/fs".to_string(), dir.path().to_string_lossy().into_owned()],
			"",
		)
		.unwrap();
		let out = dispatch(&shell, "ls", &["/host/fs".to_string()], "").unwrap();
		assert!(out.output.contains("a.txt"));
	}

	#[test]
	fn cpp_main_builds_renderable_translation_unit() {
		let shell = Shell::new();
		dispatch(&shell, "cpp", &["/tu".to_string(), "main".to_string()], "").unwrap();
		let node = shell.vfs.resolve_for_overlay("/tu", 0).unwrap();
		let ast = node.downcast_ref::<AstNode>().unwrap();
		let text = ast.to_text().unwrap();
		assert!(text.contains("int main() {"));
		assert!(text.contains("return 0;"));
	}

	#[test]
	fn sexpr_new_places_readable_node() {
		let shell = Shell::new();
		dispatch(&shell, "sexpr", &["/x".to_string(), "int".to_string(), "42".to_string()], "").unwrap();
		assert_eq!(shell.vfs.read("/x", Some(0)).unwrap(), b"42");
	}

	#[test]
	fn cat_honors_conflict_policy_across_overlays() {
		// §8 scenario 1: `overlay.policy newest` then `cat` (built on `read`)
		// should pick the newest overlay's copy instead of failing, and
		// likewise for `oldest`.
		let shell = Shell::new();
		shell.vfs.write("/a/x", b"1", 0).unwrap();
		dispatch(&shell, "overlay", &["register".to_string(), "alt".to_string()], "").unwrap();
		let alt: usize = shell.vfs.overlays.ids().into_iter().max().unwrap();
		shell.vfs.write("/a/x", b"2", alt).unwrap();

		dispatch(&shell, "overlay", &["policy".to_string(), "newest".to_string()], "").unwrap();
		assert_eq!(dispatch(&shell, "cat", &["/a/x".to_string()], "").unwrap().output, "2");

		dispatch(&shell, "overlay", &["policy".to_string(), "oldest".to_string()], "").unwrap();
		assert_eq!(dispatch(&shell, "cat", &["/a/x".to_string()], "").unwrap().output, "1");
	}

	#[test]
	fn count_redirected_through_pipeline_gains_trailing_newline() {
		// §8 scenario 3: `cat /t | grep -i a | count > /out` must leave `/out`
		// containing "2\n", not the bare "2" `count` returns to the pipeline.
		use crate::pipeline::{execute_chain, parse_chain, tokenize};
		let shell = Shell::new();
		shell.vfs.write("/t", b"apple\nbanana\navocado", 0).unwrap();
		let chain = parse_chain(tokenize("cat /t | grep -i a | count > /out").unwrap()).unwrap();
		execute_chain(&shell, &chain);
		assert_eq!(shell.vfs.read("/out", Some(0)).unwrap(), b"2\n");
	}
}
