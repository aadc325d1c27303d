//! Host command capture with a keepalive reporter (§5 "External-command
//! keepalive"). Grounded on `original_source/VfsShell/utils.cpp`'s
//! `exec_capture`: spawn the command, read its stdout to completion on the
//! calling thread, and run a second thread alongside it that prints a
//! progress line to stdout every ten seconds until the pipe closes, guarded
//! by a dedicated output mutex so its lines never interleave with whatever
//! else is mid-write to the terminal.

use crate::error::{VfsError, VfsResult};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Guards terminal writes so the keepalive thread's progress lines never
/// interleave with REPL output (§5).
static OUTPUT_MUTEX: Mutex<()> = Mutex::new(());

const REPORT_INTERVAL: Duration = Duration::from_secs(10);
const WARN_THRESHOLD: Duration = Duration::from_secs(300);

/// Runs `cmd` through the host shell, capturing its combined stdout, while a
/// keepalive thread reports elapsed time every ten seconds. `label` names
/// the command in keepalive lines; an empty label prints "external command".
pub fn exec_capture(cmd: &str, label: &str) -> VfsResult<String> {
	let mut child = Command::new("/bin/sh")
		.arg("-c")
		.arg(cmd)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.map_err(|e| VfsError::External(e.to_string()))?;

	let mut stdout = child.stdout.take().expect("piped stdout");
	let done = Arc::new(AtomicBool::new(false));
	let label = if label.is_empty() { "external command".to_string() } else { label.to_string() };
	let start = Instant::now();

	let keepalive = {
		let done = Arc::clone(&done);
		thread::spawn(move || {
			let mut warned = false;
			let mut next_report = Instant::now() + REPORT_INTERVAL;
			while !done.load(Ordering::Relaxed) {
				thread::sleep(Duration::from_millis(200));
				if done.load(Ordering::Relaxed) {
					break;
				}
				let now = Instant::now();
				if now < next_report {
					continue;
				}
				let elapsed = now.duration_since(start);
				{
					let _guard = OUTPUT_MUTEX.lock().expect("poisoned lock");
					println!("[keepalive] {label} running for {}s...", elapsed.as_secs());
					if !warned && elapsed >= WARN_THRESHOLD {
						println!("[keepalive] {label} exceeded 300s; check connectivity or abort if needed.");
						warned = true;
					}
				}
				next_report = now + REPORT_INTERVAL;
			}
		})
	};

	let mut out = String::new();
	let read_result = stdout.read_to_string(&mut out);
	done.store(true, Ordering::Relaxed);
	let _ = keepalive.join();
	let status = child.wait().map_err(|e| VfsError::External(e.to_string()))?;
	read_result.map_err(|e| VfsError::External(e.to_string()))?;

	if !status.success() {
		return Err(VfsError::External(format!("`{cmd}` exited with {status}")));
	}
	Ok(out)
}

/// Whether `program` resolves on the host's `PATH` (mirrors the original's
/// `has_cmd`, used by mount/provider adapters to decide whether a host
/// fallback is worth attempting before shelling out).
pub fn has_cmd(program: &str) -> bool {
	Command::new("/bin/sh")
		.arg("-c")
		.arg(format!("command -v {program} >/dev/null 2>&1"))
		.status()
		.map(|status| status.success())
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exec_capture_returns_stdout() {
		let out = exec_capture("echo hello", "echo").unwrap();
		assert_eq!(out.trim(), "hello");
	}

	#[test]
	fn exec_capture_reports_failure_status() {
		let err = exec_capture("exit 7", "exit").unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::External);
	}

	#[test]
	fn has_cmd_finds_sh() {
		assert!(has_cmd("sh"));
	}
}
