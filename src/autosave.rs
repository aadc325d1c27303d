//! The autosave / crash-recovery engine (§4.9, §5 "Autosave worker"): a
//! background thread that ticks once per second, debounce-saving dirty
//! tracked overlays and periodically snapshotting the base overlay for
//! crash recovery. Spawns a thread behind an `Arc<Mutex<_>>` and
//! communicates by side effect rather than a channel, since its only
//! observable effects are file writes and dirty-bit clears (§5 "Ordering").

use crate::container;
use crate::error::VfsResult;
use crate::vfs::Vfs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_secs(1);

/// Default debounce and recovery intervals (§4.9).
pub const DEFAULT_DEBOUNCE_SECS: u64 = 10;
pub const DEFAULT_RECOVERY_INTERVAL_SECS: u64 = 180;

/// The mutable half of the autosave context (§4.2 "Autosave context"):
/// everything the worker and the foreground both touch lives behind one
/// mutex, acquired by the worker before any bulk traversal of a dirty
/// overlay and by the foreground before bumping the modification clock
/// (§5).
struct Record {
	enabled: bool,
	debounce: Duration,
	recovery_interval: Duration,
	last_modification: Instant,
	last_recovery: Instant,
	tracked: Vec<usize>,
}

/// Tuning knobs a caller may override at startup (§6 config surface);
/// `Default` matches the documented defaults (10s debounce, 180s recovery).
#[derive(Debug, Clone, Copy)]
pub struct AutosaveConfig {
	pub enabled: bool,
	pub debounce_secs: u64,
	pub recovery_interval_secs: u64,
}

impl Default for AutosaveConfig {
	fn default() -> Self {
		AutosaveConfig {
			enabled: true,
			debounce_secs: DEFAULT_DEBOUNCE_SECS,
			recovery_interval_secs: DEFAULT_RECOVERY_INTERVAL_SECS,
		}
	}
}

/// The background worker itself. Holds the shared VFS it saves from and the
/// mutex-protected record the two threads coordinate through.
pub struct AutosaveEngine {
	vfs: Arc<Vfs>,
	record: Mutex<Record>,
	recovery_dir: PathBuf,
	stop: Arc<AtomicBool>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveEngine {
	/// Builds an engine bound to `vfs`, idle until [`AutosaveEngine::start`]
	/// is called. `recovery_dir` is the directory recovery snapshots land
	/// in (`.vfsh` relative to the process's current directory, per §4.9).
	pub fn new(vfs: Arc<Vfs>, config: AutosaveConfig, recovery_dir: impl Into<PathBuf>) -> Arc<Self> {
		Arc::new(AutosaveEngine {
			vfs,
			record: Mutex::new(Record {
				enabled: config.enabled,
				debounce: Duration::from_secs(config.debounce_secs),
				recovery_interval: Duration::from_secs(config.recovery_interval_secs),
				last_modification: Instant::now(),
				last_recovery: Instant::now(),
				tracked: Vec::new(),
			}),
			recovery_dir: recovery_dir.into(),
			stop: Arc::new(AtomicBool::new(false)),
			handle: Mutex::new(None),
		})
	}

	/// Adds `id` to the set of overlays the debounced save checks on every
	/// tick. Registering an overlay with a bound source (the solution
	/// lifecycle's Loaded states, §4.11) should track it here.
	pub fn track(&self, id: usize) {
		let mut record = self.record.lock().expect("poisoned lock");
		if !record.tracked.contains(&id) {
			record.tracked.push(id);
		}
	}

	pub fn untrack(&self, id: usize) {
		let mut record = self.record.lock().expect("poisoned lock");
		record.tracked.retain(|&tracked| tracked != id);
		for tracked in record.tracked.iter_mut() {
			if *tracked > id {
				*tracked -= 1;
			}
		}
	}

	pub fn set_enabled(&self, enabled: bool) {
		self.record.lock().expect("poisoned lock").enabled = enabled;
	}

	pub fn enabled(&self) -> bool {
		self.record.lock().expect("poisoned lock").enabled
	}

	/// Foreground writers call this after any mutation (§5: "Foreground
	/// writers increment the 'last modification' timestamp under this
	/// mutex"), resetting the debounce window.
	pub fn note_modification(&self) {
		self.record.lock().expect("poisoned lock").last_modification = Instant::now();
	}

	/// Spawns the one-second-tick background thread. A no-op if already
	/// running.
	pub fn start(self: &Arc<Self>) {
		let mut handle = self.handle.lock().expect("poisoned lock");
		if handle.is_some() {
			return;
		}
		let engine = Arc::clone(self);
		self.stop.store(false, Ordering::SeqCst);
		*handle = Some(thread::spawn(move || {
			while !engine.stop.load(Ordering::SeqCst) {
				thread::sleep(TICK);
				engine.tick();
			}
		}));
	}

	/// Signals the worker thread to stop and joins it.
	pub fn shutdown(&self) {
		self.stop.store(true, Ordering::SeqCst);
		if let Some(handle) = self.handle.lock().expect("poisoned lock").take() {
			let _ = handle.join();
		}
	}

	/// One tick's worth of work: the debounced save check, then the
	/// recovery-snapshot check (§4.9). Exposed for the REPL's terminal
	/// shortcut, which forces a save out of cadence without waiting for the
	/// debounce to elapse.
	pub fn tick(&self) {
		self.debounced_save();
		self.recovery_snapshot();
	}

	fn debounced_save(&self) {
		let (enabled, tracked, due) = {
			let record = self.record.lock().expect("poisoned lock");
			(record.enabled, record.tracked.clone(), record.last_modification.elapsed() >= record.debounce)
		};
		if !enabled || !due {
			return;
		}
		let mut any_saved = false;
		for id in tracked {
			let Ok(true) = self.vfs.overlays.dirty(id) else { continue };
			// Write failures are swallowed (§4.9): an interactive session
			// must never stall or crash because a save slot failed.
			if container::save_overlay(&self.vfs.overlays, id, None).is_ok() {
				let _ = self.vfs.overlays.clear_dirty(id);
				any_saved = true;
			}
		}
		if any_saved {
			self.record.lock().expect("poisoned lock").last_modification = Instant::now();
		}
	}

	fn recovery_snapshot(&self) {
		let due = {
			let record = self.record.lock().expect("poisoned lock");
			record.last_recovery.elapsed() >= record.recovery_interval
		};
		if !due {
			return;
		}
		let _ = self.write_recovery_snapshot();
		self.record.lock().expect("poisoned lock").last_recovery = Instant::now();
	}

	/// Writes `.vfsh/recovery.vfs` from the current base overlay, bypassing
	/// dirty bits and source bindings entirely (§4.9).
	fn write_recovery_snapshot(&self) -> VfsResult<()> {
		let root = self.vfs.overlays.root_of(0)?;
		let bytes = container::write_overlay(&root, None);
		std::fs::create_dir_all(&self.recovery_dir).map_err(crate::error::VfsError::from)?;
		std::fs::write(self.recovery_dir.join("recovery.vfs"), bytes).map_err(crate::error::VfsError::from)?;
		Ok(())
	}

	/// Forces an out-of-cadence save of overlay `id` (§4.9 "a hook that the
	/// REPL invokes on terminal shortcut"), regardless of its dirty bit or
	/// the debounce window.
	pub fn force_save(&self, id: usize) -> VfsResult<PathBuf> {
		let path = container::save_overlay(&self.vfs.overlays, id, None)?;
		self.vfs.overlays.clear_dirty(id)?;
		self.record.lock().expect("poisoned lock").last_modification = Instant::now();
		Ok(path)
	}
}

impl Drop for AutosaveEngine {
	fn drop(&mut self) {
		self.shutdown();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tracked_ids_shift_down_after_untrack() {
		let vfs = Arc::new(Vfs::new());
		let engine = AutosaveEngine::new(vfs, AutosaveConfig::default(), ".vfsh");
		engine.track(1);
		engine.track(2);
		engine.untrack(1);
		assert_eq!(engine.record.lock().unwrap().tracked, vec![1]);
	}

	#[test]
	fn disabled_engine_skips_debounced_save() {
		let vfs = Arc::new(Vfs::new());
		let alt = vfs.overlays.register("alt").unwrap();
		vfs.write("/x", b"1", alt).unwrap();
		let engine = AutosaveEngine::new(Arc::clone(&vfs), AutosaveConfig { enabled: false, ..Default::default() }, ".vfsh");
		engine.track(alt);
		engine.debounced_save();
		assert!(vfs.overlays.dirty(alt).unwrap());
	}

	#[test]
	fn recovery_snapshot_writes_file_regardless_of_dirty_bits() {
		let dir = tempfile::tempdir().unwrap();
		let vfs = Arc::new(Vfs::new());
		vfs.write("/x", b"hello", 0).unwrap();
		let engine = AutosaveEngine::new(vfs, AutosaveConfig::default(), dir.path());
		engine.write_recovery_snapshot().unwrap();
		assert!(dir.path().join("recovery.vfs").exists());
	}

	#[test]
	fn force_save_writes_immediately_and_clears_dirty() {
		let dir = tempfile::tempdir().unwrap();
		let vfs = Arc::new(Vfs::new());
		let alt = vfs.overlays.register("alt").unwrap();
		vfs.write("/x", b"1", alt).unwrap();
		let destination = dir.path().join("alt.vfs");
		vfs.overlays.set_source(alt, Some(destination.to_string_lossy().into_owned())).unwrap();
		let engine = AutosaveEngine::new(vfs.clone(), AutosaveConfig::default(), dir.path());
		engine.force_save(alt).unwrap();
		assert!(!vfs.overlays.dirty(alt).unwrap());
		assert!(destination.exists());
	}
}
