//! The remote daemon's wire framing (§6 "Remote daemon (framing only)"): a
//! TCP listener that accepts `EXEC <shell-command>\n` lines and answers with
//! exactly one `OK <stdout>\n` or `ERR <message>\n` line per request. Grounded
//! on [`crate::node::mount::RemoteMountNode`], which speaks the client half
//! of the same protocol; this is its server half, one thread per connection,
//! never sharing a single `TcpStream` across threads without its own lock.

use crate::exec;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

/// Runs the daemon loop on `port`, blocking forever. Each accepted
/// connection is handled on its own thread so a slow or stuck client cannot
/// stall others (§5 "Remote mount sockets are single-writer per node").
pub fn serve(port: u16) -> std::io::Result<()> {
	let listener = TcpListener::bind(("0.0.0.0", port))?;
	log::debug!("remote daemon listening on port {port}");
	serve_listener(listener)
}

/// The accept loop itself, split from [`serve`] so tests can bind an
/// ephemeral port (0) and learn the real one via `TcpListener::local_addr`
/// before handing the listener off here.
pub fn serve_listener(listener: TcpListener) -> std::io::Result<()> {
	for stream in listener.incoming() {
		match stream {
			Ok(stream) => {
				thread::spawn(move || handle_connection(stream));
			}
			Err(e) => log::warn!("daemon accept failed: {e}"),
		}
	}
	Ok(())
}

fn handle_connection(stream: TcpStream) {
	let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "?".to_string());
	let mut writer = match stream.try_clone() {
		Ok(clone) => clone,
		Err(e) => {
			log::warn!("daemon connection {peer}: clone failed: {e}");
			return;
		}
	};
	let reader = BufReader::new(stream);
	for line in reader.lines() {
		let line = match line {
			Ok(line) => line,
			Err(e) => {
				log::warn!("daemon connection {peer}: read failed: {e}");
				return;
			}
		};
		let response = handle_line(&line);
		if writer.write_all(response.as_bytes()).is_err() {
			return;
		}
	}
}

fn handle_line(line: &str) -> String {
	let Some(rest) = line.strip_prefix("EXEC ") else {
		return "ERR unrecognized command\n".to_string();
	};
	// The response must be exactly one line; a captured command may itself
	// print newlines, so they are flattened before framing.
	match exec::exec_capture(rest, "daemon exec") {
		Ok(out) => format!("OK {}\n", out.replace('\n', "\\n")),
		Err(e) => format!("ERR {}\n", e.to_string().replace('\n', "\\n")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_unknown_verb() {
		assert_eq!(handle_line("PING"), "ERR unrecognized command\n");
	}

	#[test]
	fn exec_verb_runs_and_flattens_output() {
		let response = handle_line("EXEC echo hi");
		assert_eq!(response, "OK hi\n");
	}
}
