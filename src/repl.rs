//! The raw-mode line editor and the solution lifecycle state machine
//! (§4.10 "REPL driver", §4.11). Authored straight against `crossterm`'s
//! documented key-event API (already carried in the dependency stack, §6);
//! the RAII `enable_raw_mode`/`disable_raw_mode` guard mirrors the
//! drop-to-restore pattern `node::mount::LibraryMountNode` uses for
//! `libloading::Library` — acquire a host resource eagerly, give it back
//! on drop.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Enables raw mode for the editor's lifetime, restoring the terminal on
/// drop regardless of how the scope is left.
struct RawMode;

impl RawMode {
	fn enable() -> io::Result<Self> {
		enable_raw_mode()?;
		Ok(RawMode)
	}
}

impl Drop for RawMode {
	fn drop(&mut self) {
		let _ = disable_raw_mode();
	}
}

/// What the line editor produced for one prompt cycle (§4.10).
pub enum Input {
	/// A complete line, submitted with Enter.
	Line(String),
	/// End of input (Ctrl-D on an empty line).
	Eof,
}

/// A raw-mode, history-aware line editor (§4.10 "REPL driver"): arrow-key
/// history navigation, in-line cursor movement, Ctrl-A/E/U/K editing, and
/// the `F3` / `ESC O R` save shortcut. History is loaded from and persisted
/// to a user-scoped file.
pub struct LineEditor {
	history: Vec<String>,
	history_path: Option<PathBuf>,
}

impl LineEditor {
	/// Loads history from `history_path` if it exists (§4.10: "History is
	/// persisted to a user-scoped file and loaded at startup").
	pub fn new(history_path: Option<PathBuf>) -> Self {
		let history = history_path
			.as_deref()
			.and_then(|path| std::fs::read_to_string(path).ok())
			.map(|contents| contents.lines().map(str::to_string).collect())
			.unwrap_or_default();
		LineEditor { history, history_path }
	}

	/// The default user-scoped history path, `<data dir>/vfsh/history`.
	pub fn default_history_path() -> Option<PathBuf> {
		dirs::data_dir().map(|dir| dir.join("vfsh").join("history"))
	}

	pub fn history(&self) -> &[String] {
		&self.history
	}

	pub fn push_history(&mut self, line: &str) {
		if !line.is_empty() {
			self.history.push(line.to_string());
		}
	}

	/// Appends the in-memory history to `history_path`, creating parent
	/// directories as needed. Swallows failures the same way the autosave
	/// worker does — losing history is not worth disrupting the session.
	pub fn save_history(&self) {
		let Some(path) = &self.history_path else { return };
		if let Some(parent) = path.parent() {
			let _ = std::fs::create_dir_all(parent);
		}
		let _ = std::fs::write(path, self.history.join("\n"));
	}

	/// Reads one line in raw mode, rendering `prompt` before the buffer on
	/// every redraw. `save_hook`, if given, is invoked (not awaited for
	/// success/failure beyond logging) when the user presses the save
	/// shortcut without submitting the line.
	pub fn read_line(&mut self, prompt: &str, mut save_hook: Option<&mut dyn FnMut()>) -> io::Result<Input> {
		let _raw = RawMode::enable()?;
		let mut stdout = io::stdout();
		let mut buffer: Vec<char> = Vec::new();
		let mut cursor = 0usize;
		let mut history_cursor: Option<usize> = None;

		redraw(&mut stdout, prompt, &buffer, cursor)?;
		loop {
			if !event::poll(Duration::from_secs(3600))? {
				continue;
			}
			let Event::Key(KeyEvent { code, modifiers, .. }) = event::read()? else {
				continue;
			};
			match (code, modifiers) {
				(KeyCode::Enter, _) => {
					print!("\r\n");
					stdout.flush()?;
					let line: String = buffer.into_iter().collect();
					return Ok(Input::Line(line));
				}
				(KeyCode::Char('d'), KeyModifiers::CONTROL) if buffer.is_empty() => {
					print!("\r\n");
					stdout.flush()?;
					return Ok(Input::Eof);
				}
				(KeyCode::Char('c'), KeyModifiers::CONTROL) => {
					// Discards the current line and redraws the prompt
					// (§5 "Cancellation"), rather than exiting the editor.
					buffer.clear();
					cursor = 0;
					history_cursor = None;
				}
				(KeyCode::Char('a'), KeyModifiers::CONTROL) => cursor = 0,
				(KeyCode::Char('e'), KeyModifiers::CONTROL) => cursor = buffer.len(),
				(KeyCode::Char('u'), KeyModifiers::CONTROL) => {
					buffer.drain(0..cursor);
					cursor = 0;
				}
				(KeyCode::Char('k'), KeyModifiers::CONTROL) => {
					buffer.truncate(cursor);
				}
				(KeyCode::F(3), _) => {
					if let Some(hook) = save_hook.as_deref_mut() {
						hook();
					}
				}
				(KeyCode::Backspace, _) => {
					if cursor > 0 {
						buffer.remove(cursor - 1);
						cursor -= 1;
					}
				}
				(KeyCode::Delete, _) => {
					if cursor < buffer.len() {
						buffer.remove(cursor);
					}
				}
				(KeyCode::Left, _) => cursor = cursor.saturating_sub(1),
				(KeyCode::Right, _) => cursor = (cursor + 1).min(buffer.len()),
				(KeyCode::Home, _) => cursor = 0,
				(KeyCode::End, _) => cursor = buffer.len(),
				(KeyCode::Up, _) => {
					if !self.history.is_empty() {
						let next = match history_cursor {
							Some(i) => i.saturating_sub(1),
							None => self.history.len() - 1,
						};
						history_cursor = Some(next);
						buffer = self.history[next].chars().collect();
						cursor = buffer.len();
					}
				}
				(KeyCode::Down, _) => match history_cursor {
					Some(i) if i + 1 < self.history.len() => {
						history_cursor = Some(i + 1);
						buffer = self.history[i + 1].chars().collect();
						cursor = buffer.len();
					}
					Some(_) => {
						history_cursor = None;
						buffer.clear();
						cursor = 0;
					}
					None => {}
				},
				(KeyCode::Char(c), _) => {
					buffer.insert(cursor, c);
					cursor += 1;
				}
				_ => {}
			}
			redraw(&mut stdout, prompt, &buffer, cursor)?;
		}
	}
}

fn redraw(stdout: &mut io::Stdout, prompt: &str, buffer: &[char], cursor: usize) -> io::Result<()> {
	let line: String = buffer.iter().collect();
	write!(stdout, "\r\x1b[2K{prompt}{line}\r\x1b[{}C", prompt.len() + cursor)?;
	stdout.flush()
}

/// The solution lifecycle (§4.11): which state the active "solution"
/// overlay is in, tracked so the REPL knows when to prompt for a save on
/// exit and when a mutation should transition to `Dirty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionState {
	Absent,
	LoadedAutoDetected,
	LoadedExplicit,
	Dirty,
	Saved,
}

/// Tracks the active solution's overlay id and lifecycle state, and the
/// path it auto-detected or was explicitly pointed at (§4.11).
pub struct SolutionLifecycle {
	state: SolutionState,
	overlay_id: Option<usize>,
	path: Option<PathBuf>,
}

impl SolutionLifecycle {
	pub fn new() -> Self {
		SolutionLifecycle { state: SolutionState::Absent, overlay_id: None, path: None }
	}

	pub fn state(&self) -> SolutionState {
		self.state
	}

	pub fn overlay_id(&self) -> Option<usize> {
		self.overlay_id
	}

	/// Looks beside `cwd` for a file named `basename.extension` and, if
	/// found, transitions Absent→Loaded-AutoDetected (§4.11 "At startup, if
	/// a file with the appropriate extension is found beside the current
	/// directory").
	pub fn auto_detect(cwd: &Path, extension: &str) -> Option<PathBuf> {
		let entries = std::fs::read_dir(cwd).ok()?;
		for entry in entries.flatten() {
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) == Some(extension) {
				return Some(path);
			}
		}
		None
	}

	pub fn mark_auto_detected(&mut self, overlay_id: usize, path: PathBuf) {
		self.state = SolutionState::LoadedAutoDetected;
		self.overlay_id = Some(overlay_id);
		self.path = Some(path);
	}

	pub fn mark_explicit(&mut self, overlay_id: usize, path: PathBuf) {
		self.state = SolutionState::LoadedExplicit;
		self.overlay_id = Some(overlay_id);
		self.path = Some(path);
	}

	/// A mutation into the solution's own overlay transitions it to
	/// `Dirty` (§4.11); mutations to unrelated overlays are a no-op here.
	pub fn note_mutation(&mut self, overlay_id: usize) {
		if self.overlay_id == Some(overlay_id) && self.state != SolutionState::Absent {
			self.state = SolutionState::Dirty;
		}
	}

	pub fn mark_saved(&mut self) {
		if self.state != SolutionState::Absent {
			self.state = SolutionState::Saved;
		}
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn is_dirty(&self) -> bool {
		self.state == SolutionState::Dirty
	}
}

impl Default for SolutionLifecycle {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auto_detect_finds_matching_extension() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("project.vfs"), b"").unwrap();
		let found = SolutionLifecycle::auto_detect(dir.path(), "vfs").unwrap();
		assert_eq!(found.file_name().unwrap(), "project.vfs");
	}

	#[test]
	fn lifecycle_transitions_on_mutation_and_save() {
		let mut lifecycle = SolutionLifecycle::new();
		assert_eq!(lifecycle.state(), SolutionState::Absent);
		lifecycle.mark_explicit(1, PathBuf::from("/tmp/x.vfs"));
		assert_eq!(lifecycle.state(), SolutionState::LoadedExplicit);
		lifecycle.note_mutation(1);
		assert_eq!(lifecycle.state(), SolutionState::Dirty);
		assert!(lifecycle.is_dirty());
		lifecycle.mark_saved();
		assert_eq!(lifecycle.state(), SolutionState::Saved);
		assert!(!lifecycle.is_dirty());
	}

	#[test]
	fn mutation_to_unrelated_overlay_does_not_dirty() {
		let mut lifecycle = SolutionLifecycle::new();
		lifecycle.mark_explicit(1, PathBuf::from("/tmp/x.vfs"));
		lifecycle.note_mutation(2);
		assert_eq!(lifecycle.state(), SolutionState::LoadedExplicit);
	}
}
