//! Startup configuration (§6 "Environment"): the environment variables read
//! once at process start, plus the solution-extension sniffing rule used to
//! tell a `--solution` file from a `--script`. A plain struct (no builder,
//! no `OnceCell`) read once in `main` and passed down by value/reference.

use std::path::PathBuf;

/// Recognized solution/container file extensions (§6 "Persisted state").
pub const SOLUTION_EXTENSIONS: &[&str] = &["vfs", "cxpkg", "cxasm"];

pub fn has_solution_extension(path: &std::path::Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| SOLUTION_EXTENSIONS.contains(&ext))
		.unwrap_or(false)
}

/// Environment-derived configuration (§6). AI-provider fields are carried
/// only as opaque strings: this crate exposes the mount/command surfaces a
/// provider adapter would shell out through (§1 Non-goals), not the adapters
/// themselves.
#[derive(Debug, Clone)]
pub struct Config {
	pub history_file: PathBuf,
	pub snippet_dir: Option<PathBuf>,
	pub ai_provider: Option<String>,
	pub openai_api_key: Option<String>,
	pub openai_base_url: Option<String>,
	pub openai_model: Option<String>,
	pub llama_base_url: Option<String>,
	pub llama_model: Option<String>,
	pub ai_cache_dir: PathBuf,
}

impl Config {
	/// Reads every variable named by §6, in the one pass `main` performs at
	/// startup.
	pub fn from_env() -> Self {
		let history_file = std::env::var_os("CODEX_HISTORY_FILE")
			.map(PathBuf::from)
			.or_else(|| dirs::home_dir().map(|home| home.join(".codex_history")))
			.unwrap_or_else(|| PathBuf::from(".codex_history"));

		let snippet_dir = std::env::var_os("CODEX_SNIPPET_DIR").map(PathBuf::from);

		let llama_base_url = std::env::var("LLAMA_BASE_URL")
			.or_else(|_| std::env::var("LLAMA_SERVER"))
			.or_else(|_| std::env::var("LLAMA_URL"))
			.ok();

		let ai_cache_dir = std::env::var_os("CODEX_AI_CACHE_DIR")
			.map(PathBuf::from)
			.unwrap_or_else(|| PathBuf::from("cache/ai"));

		Config {
			history_file,
			snippet_dir,
			ai_provider: std::env::var("CODEX_AI_PROVIDER").ok(),
			openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
			openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
			openai_model: std::env::var("OPENAI_MODEL").ok(),
			llama_base_url,
			llama_model: std::env::var("LLAMA_MODEL").ok(),
			ai_cache_dir,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recognizes_solution_extensions() {
		assert!(has_solution_extension(std::path::Path::new("project.vfs")));
		assert!(has_solution_extension(std::path::Path::new("project.cxpkg")));
		assert!(!has_solution_extension(std::path::Path::new("project.sh")));
	}
}
