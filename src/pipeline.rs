//! The command line's tokenizer, chain parser, and executor (§4.10).
//! Grounded on [`error`]'s `VfsError`/`ErrorKind` taxonomy for reporting
//! unterminated quotes and malformed chains, and on [`resolver`]'s plain
//! state-walking style (no parser-combinator crate — the grammar is small
//! enough that a teacher writing this by hand would reach for a simple
//! iterator loop, the same way `path::split` does).

use crate::error::{VfsError, VfsResult};

/// One lexical token of a command line (§4.10 "Tokenizer").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	Word(String),
	Pipe,
	And,
	Or,
	RedirectOverwrite,
	RedirectAppend,
}

/// Splits `line` into [`Token`]s. Supports single and double quotes and a
/// single-character backslash escape outside single quotes; `|`, `||`,
/// `&&`, `>`, `>>` are recognized unquoted operators. An unterminated quote
/// or a trailing backslash is a [`VfsError::Format`].
pub fn tokenize(line: &str) -> VfsResult<Vec<Token>> {
	let mut tokens = Vec::new();
	let chars: Vec<char> = line.chars().collect();
	let mut i = 0;
	let mut current = String::new();
	let mut has_current = false;

	macro_rules! flush {
		() => {
			if has_current {
				tokens.push(Token::Word(std::mem::take(&mut current)));
				has_current = false;
			}
		};
	}

	while i < chars.len() {
		let c = chars[i];
		match c {
			' ' | '\t' => {
				flush!();
				i += 1;
			}
			'\'' => {
				has_current = true;
				i += 1;
				let start = i;
				loop {
					if i >= chars.len() {
						return Err(VfsError::usage(format!("unterminated single quote starting at byte {start}")));
					}
					if chars[i] == '\'' {
						i += 1;
						break;
					}
					current.push(chars[i]);
					i += 1;
				}
			}
			'"' => {
				has_current = true;
				i += 1;
				loop {
					if i >= chars.len() {
						return Err(VfsError::usage("unterminated double quote".to_string()));
					}
					match chars[i] {
						'"' => {
							i += 1;
							break;
						}
						'\\' if i + 1 < chars.len() => {
							current.push(chars[i + 1]);
							i += 2;
						}
						other => {
							current.push(other);
							i += 1;
						}
					}
				}
			}
			'\\' => {
				if i + 1 >= chars.len() {
					return Err(VfsError::usage("trailing backslash with nothing to escape".to_string()));
				}
				has_current = true;
				current.push(chars[i + 1]);
				i += 2;
			}
			'|' if chars.get(i + 1) == Some(&'|') => {
				flush!();
				tokens.push(Token::Or);
				i += 2;
			}
			'|' => {
				flush!();
				tokens.push(Token::Pipe);
				i += 1;
			}
			'&' if chars.get(i + 1) == Some(&'&') => {
				flush!();
				tokens.push(Token::And);
				i += 2;
			}
			'>' if chars.get(i + 1) == Some(&'>') => {
				flush!();
				tokens.push(Token::RedirectAppend);
				i += 2;
			}
			'>' => {
				flush!();
				tokens.push(Token::RedirectOverwrite);
				i += 1;
			}
			other => {
				has_current = true;
				current.push(other);
				i += 1;
			}
		}
	}
	flush!();
	Ok(tokens)
}

/// A single command within a pipeline: its name and arguments (§4.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
	pub name: String,
	pub args: Vec<String>,
}

/// Where a pipeline's final captured output is written, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
	pub path: String,
	pub append: bool,
}

/// A `|`-chained sequence of commands plus an optional trailing redirect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pipeline {
	pub commands: Vec<CommandInvocation>,
	pub redirect: Option<Redirect>,
}

/// How a [`ChainEntry`] relates to the one before it (§4.10 "Chain parser").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
	/// The first entry in a chain, or explicitly unconditional.
	None,
	And,
	Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
	pub connector: Connector,
	pub pipeline: Pipeline,
}

/// Parses a token stream into an ordered list of [`ChainEntry`] (§4.10
/// "Chain parser"). `|` separates commands within a pipeline (a trailing
/// `|` is an error); `&&`/`||` end the current pipeline and must be
/// followed by another command; `>`/`>>` terminate the current command's
/// args and take exactly one following token as the redirect target.
pub fn parse_chain(tokens: Vec<Token>) -> VfsResult<Vec<ChainEntry>> {
	let mut entries = Vec::new();
	let mut connector = Connector::None;
	let mut pipeline = Pipeline::default();
	let mut current: Option<CommandInvocation> = None;
	let mut iter = tokens.into_iter().peekable();

	macro_rules! flush_command {
		() => {
			if let Some(command) = current.take() {
				pipeline.commands.push(command);
			}
		};
	}
	macro_rules! flush_pipeline {
		() => {{
			flush_command!();
			if pipeline.commands.is_empty() {
				return Err(VfsError::usage("empty command in pipeline".to_string()));
			}
			entries.push(ChainEntry {
				connector,
				pipeline: std::mem::take(&mut pipeline),
			});
		}};
	}

	while let Some(token) = iter.next() {
		match token {
			Token::Word(word) => match &mut current {
				Some(command) => command.args.push(word),
				None => current = Some(CommandInvocation { name: word, args: Vec::new() }),
			},
			Token::Pipe => {
				flush_command!();
				if pipeline.commands.is_empty() {
					return Err(VfsError::usage("`|` with no preceding command".to_string()));
				}
				if iter.peek().is_none() {
					return Err(VfsError::usage("trailing `|` with no following command".to_string()));
				}
			}
			Token::And | Token::Or => {
				flush_pipeline!();
				if iter.peek().is_none() {
					return Err(VfsError::usage("dangling logical operator".to_string()));
				}
				connector = if token == Token::And { Connector::And } else { Connector::Or };
			}
			Token::RedirectOverwrite | Token::RedirectAppend => {
				flush_command!();
				if pipeline.commands.is_empty() {
					return Err(VfsError::usage("redirect with no preceding command".to_string()));
				}
				let target = match iter.next() {
					Some(Token::Word(path)) => path,
					_ => return Err(VfsError::usage("redirect operator must be followed by exactly one path".to_string())),
				};
				pipeline.redirect = Some(Redirect {
					path: target,
					append: token == Token::RedirectAppend,
				});
			}
		}
	}
	if current.is_some() || !pipeline.commands.is_empty() {
		flush_pipeline!();
	}
	Ok(entries)
}

/// What a single command (§4.10 "Command contracts") reports back to its
/// pipeline: whether it succeeded, whether it asks the REPL to exit, and
/// its captured standard output.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
	pub success: bool,
	pub exit_requested: bool,
	pub output: String,
}

impl CommandOutcome {
	pub fn ok(output: impl Into<String>) -> Self {
		CommandOutcome { success: true, exit_requested: false, output: output.into() }
	}

	pub fn err(output: impl Into<String>) -> Self {
		CommandOutcome { success: false, exit_requested: false, output: output.into() }
	}

	pub fn exit() -> Self {
		CommandOutcome { success: true, exit_requested: true, output: String::new() }
	}
}

/// The dispatch seam between the executor and the built-in command set
/// (§4.10), implemented by whatever holds the session's [`crate::vfs::Vfs`]
/// and history. Kept as a trait rather than a concrete type so the
/// executor has no dependency on the command registry's internals.
pub trait CommandHost {
	fn run(&self, name: &str, args: &[String], stdin: &str) -> CommandOutcome;

	/// Writes `bytes` to a VFS path, used for the pipeline's trailing
	/// redirect (§4.10 "the captured output is written... to the
	/// normalized VFS path in the primary overlay").
	fn write_redirect(&self, path: &str, bytes: &[u8], append: bool) -> VfsResult<()>;
}

/// The result of executing a full chain: whether the REPL should exit, plus
/// whatever was emitted to the terminal (chain entries with no redirect).
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
	pub exit_requested: bool,
	pub terminal_output: Vec<String>,
	/// Whether the chain's last executed entry succeeded; a script's exit
	/// code is derived from this (§6 "nonzero... if the last chain entry
	/// failed").
	pub last_success: bool,
}

/// Runs every [`ChainEntry`] against `host` in order (§4.10 "Executor"):
/// `&&` skips when the previous entry failed, `||` skips when it
/// succeeded, an unconditional entry always runs. Within a pipeline, each
/// command after the first receives the previous command's captured
/// output as its "stdin" string.
pub fn execute_chain(host: &dyn CommandHost, chain: &[ChainEntry]) -> ExecutionOutcome {
	let mut outcome = ExecutionOutcome::default();
	let mut last_success = true;

	for entry in chain {
		let should_run = match entry.connector {
			Connector::None => true,
			Connector::And => last_success,
			Connector::Or => !last_success,
		};
		if !should_run {
			continue;
		}

		let mut stdin = String::new();
		let mut success = true;
		let mut exit_requested = false;
		for command in &entry.pipeline.commands {
			let result = host.run(&command.name, &command.args, &stdin);
			success = result.success;
			exit_requested |= result.exit_requested;
			stdin = result.output;
		}
		last_success = success;
		if exit_requested {
			outcome.exit_requested = true;
		}

		match &entry.pipeline.redirect {
			Some(redirect) => {
				// Captured output carries no terminator of its own (commands
				// return plain text, §9 "Command capture"); redirecting into a
				// file gives its last line the newline a terminal would have
				// supplied via the prompt's next line (§8 scenario 3).
				let mut bytes = stdin.into_bytes();
				if !bytes.is_empty() && bytes.last() != Some(&b'\n') {
					bytes.push(b'\n');
				}
				if let Err(e) = host.write_redirect(&redirect.path, &bytes, redirect.append) {
					outcome.terminal_output.push(format!("error: {e}"));
				}
			}
			None => outcome.terminal_output.push(stdin),
		}

		if outcome.exit_requested {
			break;
		}
	}
	outcome.last_success = last_success;
	outcome
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenizes_quotes_and_operators() {
		let tokens = tokenize(r#"grep -i "hello world" /f | uniq >> /out"#).unwrap();
		assert_eq!(
			tokens,
			vec![
				Token::Word("grep".into()),
				Token::Word("-i".into()),
				Token::Word("hello world".into()),
				Token::Word("/f".into()),
				Token::Pipe,
				Token::Word("uniq".into()),
				Token::RedirectAppend,
				Token::Word("/out".into()),
			]
		);
	}

	#[test]
	fn unterminated_quote_is_error() {
		assert!(tokenize("echo 'unterminated").is_err());
	}

	#[test]
	fn trailing_backslash_is_error() {
		assert!(tokenize("echo \\").is_err());
	}

	#[test]
	fn trailing_pipe_is_rejected_by_parser() {
		let tokens = tokenize("ls |").unwrap();
		assert!(parse_chain(tokens).is_err());
	}

	#[test]
	fn chain_parse_errors_classify_as_usage() {
		// §7: "bad operator placement in the command chain" is a Usage error,
		// not Format (Format is reserved for container/AST record decoding).
		let err = parse_chain(tokenize("ls |").unwrap()).unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
		let err = tokenize("echo 'unterminated").unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
	}

	#[test]
	fn dangling_logical_operator_is_rejected() {
		let err = parse_chain(tokenize("echo a &&").unwrap()).unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
		assert!(err.to_string().contains("dangling logical operator"));
		let err = parse_chain(tokenize("echo a ||").unwrap()).unwrap_err();
		assert!(err.to_string().contains("dangling logical operator"));
	}

	#[test]
	fn zero_command_pipeline_is_usage_error() {
		let err = parse_chain(tokenize("&& echo a").unwrap()).unwrap_err();
		assert_eq!(err.kind(), crate::error::ErrorKind::Usage);
	}

	#[test]
	fn chain_parses_connectors_and_redirect() {
		let tokens = tokenize("mkdir /a && touch /a/b || echo fail > /log").unwrap();
		let chain = parse_chain(tokens).unwrap();
		assert_eq!(chain.len(), 3);
		assert_eq!(chain[0].connector, Connector::None);
		assert_eq!(chain[1].connector, Connector::And);
		assert_eq!(chain[2].connector, Connector::Or);
		assert_eq!(chain[2].pipeline.redirect, Some(Redirect { path: "/log".into(), append: false }));
	}

	#[test]
	fn empty_line_parses_to_no_entries() {
		assert!(parse_chain(tokenize("").unwrap()).unwrap().is_empty());
	}

	struct RecordingHost {
		redirected: std::sync::Mutex<Vec<(String, Vec<u8>, bool)>>,
	}

	impl CommandHost for RecordingHost {
		fn run(&self, name: &str, args: &[String], stdin: &str) -> CommandOutcome {
			match name {
				"echo" => CommandOutcome::ok(args.join(" ")),
				"uniq" => {
					let mut seen = None;
					let mut out = String::new();
					for line in stdin.lines() {
						if seen != Some(line) {
							out.push_str(line);
							out.push('\n');
						}
						seen = Some(line);
					}
					CommandOutcome::ok(out)
				}
				"false" => CommandOutcome::err(""),
				_ => CommandOutcome::err(format!("unknown command `{name}`")),
			}
		}

		fn write_redirect(&self, path: &str, bytes: &[u8], append: bool) -> VfsResult<()> {
			self.redirected.lock().unwrap().push((path.to_string(), bytes.to_vec(), append));
			Ok(())
		}
	}

	#[test]
	fn pipeline_feeds_stdout_forward_and_redirects_final_output() {
		let host = RecordingHost { redirected: std::sync::Mutex::new(Vec::new()) };
		let chain = parse_chain(tokenize("echo a a b >> /out").unwrap()).unwrap();
		let outcome = execute_chain(&host, &chain);
		assert!(outcome.terminal_output.is_empty());
		let recorded = host.redirected.lock().unwrap();
		assert_eq!(recorded[0].0, "/out");
		assert!(recorded[0].2);
	}

	#[test]
	fn and_skips_after_failure_or_runs_after_success() {
		let host = RecordingHost { redirected: std::sync::Mutex::new(Vec::new()) };
		let chain = parse_chain(tokenize("false && echo skipped").unwrap()).unwrap();
		let outcome = execute_chain(&host, &chain);
		assert_eq!(outcome.terminal_output, vec![""]);
	}
}
