//! `vfsh`: the interactive shell binary (§6 "External interfaces"). Parses
//! the CLI surface, wires the autosave worker and solution lifecycle to a
//! [`Shell`], and either runs the remote daemon, replays a script, or drives
//! the raw-mode REPL.

use anyhow::Context;
use clap::Parser;
use codex_vfsh::autosave::{AutosaveConfig, AutosaveEngine};
use codex_vfsh::config::{self, Config};
use codex_vfsh::pipeline::{self, CommandHost};
use codex_vfsh::repl::{Input, LineEditor, SolutionLifecycle};
use codex_vfsh::{container, daemon, Shell};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `prog [--solution <file>] [--daemon <port>] [--script <file>] [positional] [-]`
/// (§6). The positional form is disambiguated from a script by its
/// extension (§6 "Persisted state").
#[derive(Parser, Debug)]
#[command(name = "vfsh", about = "Overlay-structured virtual filesystem shell")]
struct Cli {
	/// Solution file to load at startup (container format v3).
	#[arg(long)]
	solution: Option<PathBuf>,

	/// Run as a remote daemon on this TCP port instead of interactively.
	#[arg(long)]
	daemon: Option<u16>,

	/// Script file to replay non-interactively.
	#[arg(long)]
	script: Option<PathBuf>,

	/// Either the trailing `-` fallthrough marker after `--script`, or a
	/// bare solution-or-script path when neither flag was given.
	positional: Vec<String>,
}

struct Resolved {
	solution: Option<PathBuf>,
	script: Option<PathBuf>,
	daemon: Option<u16>,
	fallthrough: bool,
}

fn resolve_args(cli: Cli) -> Resolved {
	let mut solution = cli.solution;
	let mut script = cli.script;
	let mut fallthrough = false;
	for p in cli.positional {
		if p == "-" {
			fallthrough = true;
		} else if solution.is_none() && script.is_none() {
			let path = PathBuf::from(&p);
			if config::has_solution_extension(&path) {
				solution = Some(path);
			} else {
				script = Some(path);
			}
		}
	}
	Resolved { solution, script, daemon: cli.daemon, fallthrough }
}

fn main() {
	env_logger::init();
	let cli = Cli::parse();
	let resolved = resolve_args(cli);
	std::process::exit(run(resolved));
}

fn run(resolved: Resolved) -> i32 {
	let _config: Config = Config::from_env();

	if let Some(port) = resolved.daemon {
		if let Err(e) = daemon::serve(port).context("daemon failed to start") {
			eprintln!("error: {e:#}");
			return 1;
		}
		return 0;
	}

	let shell = Arc::new(Shell::new());
	let autosave = AutosaveEngine::new(shell.vfs_handle(), AutosaveConfig::default(), ".vfsh");
	autosave.start();
	shell.set_autosave(Arc::clone(&autosave));

	let mut lifecycle = SolutionLifecycle::new();
	load_solution(&shell, &mut lifecycle, resolved.solution.as_deref());

	let exit_code = if let Some(script_path) = &resolved.script {
		let code = run_script(&shell, &mut lifecycle, script_path);
		if resolved.fallthrough {
			run_interactive(&shell, &mut lifecycle);
			0
		} else {
			code
		}
	} else {
		run_interactive(&shell, &mut lifecycle);
		0
	};

	prompt_save_on_exit(&shell, &mut lifecycle);
	autosave.shutdown();
	exit_code
}

fn load_solution(shell: &Shell, lifecycle: &mut SolutionLifecycle, explicit: Option<&Path>) {
	let candidate = explicit.map(|p| (p.to_path_buf(), true)).or_else(|| {
		SolutionLifecycle::auto_detect(Path::new("."), "vfs").map(|p| (p, false))
	});
	let Some((path, explicit)) = candidate else { return };
	let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("solution").to_string();
	match container::load_into_stack(&shell.vfs.overlays, &name, &path) {
		Ok(id) => {
			if let Some(engine) = shell.autosave.lock().expect("poisoned lock").as_ref() {
				engine.track(id);
			}
			if explicit {
				lifecycle.mark_explicit(id, path);
			} else {
				lifecycle.mark_auto_detected(id, path);
			}
		}
		Err(e) => eprintln!("error: failed to load solution `{}`: {e}", path.display()),
	}
}

/// Replays `script_path` line by line through the same chain
/// parser/executor the REPL uses (§4.10), returning the process exit code
/// (§6: nonzero only if the *last* chain entry of the script failed).
fn run_script(shell: &Shell, lifecycle: &mut SolutionLifecycle, script_path: &Path) -> i32 {
	let contents = if script_path.as_os_str() == "-" {
		let mut buf = String::new();
		let stdin = std::io::stdin();
		let mut handle = stdin.lock();
		use std::io::Read;
		if let Err(e) = handle.read_to_string(&mut buf) {
			eprintln!("error: failed to read script from stdin: {e}");
			return 1;
		}
		buf
	} else {
		let result: anyhow::Result<String> = std::fs::read_to_string(script_path)
			.with_context(|| format!("failed to read script `{}`", script_path.display()));
		match result {
			Ok(c) => c,
			Err(e) => {
				eprintln!("error: {e:#}");
				return 1;
			}
		}
	};

	let mut last_failed = false;
	for line in contents.lines() {
		last_failed = !run_line(shell, lifecycle, line);
	}
	if last_failed {
		1
	} else {
		0
	}
}

/// Drives the raw-mode REPL until EOF or an `exit`/`quit` command (§4.10).
fn run_interactive(shell: &Shell, lifecycle: &mut SolutionLifecycle) {
	let mut editor = LineEditor::new(LineEditor::default_history_path());
	loop {
		let prompt = format!("{} > ", shell.vfs.cwd.path());
		let autosave = shell.autosave.lock().expect("poisoned lock").clone();
		let overlay_id = lifecycle.overlay_id();
		let mut hook = || {
			if let (Some(engine), Some(id)) = (&autosave, overlay_id) {
				if engine.force_save(id).is_ok() {
					lifecycle.mark_saved();
				}
			}
		};
		let input = match editor.read_line(&prompt, Some(&mut hook)) {
			Ok(input) => input,
			Err(e) => {
				eprintln!("error: terminal input failed: {e}");
				break;
			}
		};
		let line = match input {
			Input::Line(line) => line,
			Input::Eof => break,
		};
		if !line.trim().is_empty() {
			editor.push_history(&line);
			editor.save_history();
			shell.record_history(&line);
		}
		if line.trim() == "exit" || line.trim() == "quit" {
			break;
		}
		run_line(shell, lifecycle, &line);
	}
}

/// Tokenizes, parses, and executes one line, printing terminal output and
/// diagnostics (§4.10, §7). Returns whether the chain's last entry
/// succeeded.
fn run_line(shell: &Shell, lifecycle: &mut SolutionLifecycle, line: &str) -> bool {
	let tokens = match pipeline::tokenize(line) {
		Ok(t) => t,
		Err(e) => {
			println!("{}", e.diagnostic());
			return false;
		}
	};
	let chain = match pipeline::parse_chain(tokens) {
		Ok(c) => c,
		Err(e) => {
			println!("{}", e.diagnostic());
			return false;
		}
	};
	if chain.is_empty() {
		return true;
	}
	let outcome = pipeline::execute_chain(shell, &chain);
	for line in &outcome.terminal_output {
		if !line.is_empty() {
			println!("{line}");
		}
	}
	if let Some(id) = lifecycle.overlay_id() {
		if shell.vfs.overlays.dirty(id).unwrap_or(false) {
			lifecycle.note_mutation(id);
		}
	}
	let _ = std::io::stdout().flush();
	outcome.last_success
}

/// At exit, if the active solution is `Dirty`, prompts for a save (§4.11).
fn prompt_save_on_exit(shell: &Shell, lifecycle: &mut SolutionLifecycle) {
	if !lifecycle.is_dirty() {
		return;
	}
	print!("Save changes? [y/N] ");
	let _ = std::io::stdout().flush();
	let mut answer = String::new();
	if std::io::stdin().lock().read_line(&mut answer).is_err() {
		return;
	}
	if answer.trim().eq_ignore_ascii_case("y") {
		if let Some(id) = lifecycle.overlay_id() {
			match codex_vfsh::container::save_overlay(&shell.vfs.overlays, id, None) {
				Ok(_) => lifecycle.mark_saved(),
				Err(e) => eprintln!("error: save failed: {e}"),
			}
		}
	}
}
