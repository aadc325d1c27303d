//! The planner AST value (§4.8): small structured-note types used by the
//! (out-of-scope) planning/training harness to stash jobs, goals, and free
//! text inside the VFS.

use crate::ast::codec::{ByteReader, ByteWriter};
use crate::error::VfsError;

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
	pub description: String,
	pub priority: u32,
	pub completed: bool,
	pub assignee: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerNode {
	Jobs(Vec<Job>),
	Goals(Vec<String>),
	Ideas(Vec<String>),
	Deps(Vec<String>),
	Implemented(Vec<String>),
	Research(Vec<String>),
	Root(String),
	SubPlan(String),
	Strategy(String),
	Notes(String),
}

fn encode_string_list(w: &mut ByteWriter, items: &[String]) {
	w.write_u32(items.len() as u32);
	for item in items {
		w.write_string(item);
	}
}

fn decode_string_list(r: &mut ByteReader) -> Result<Vec<String>, VfsError> {
	let count = r.read_u32()? as usize;
	let mut items = Vec::with_capacity(count);
	for _ in 0..count {
		items.push(r.read_string()?);
	}
	Ok(items)
}

fn to_text_string_list(items: &[String]) -> String {
	items.join("\n")
}

fn from_text_string_list(text: &str) -> Vec<String> {
	text.lines().map(str::to_string).filter(|l| !l.is_empty()).collect()
}

pub fn encode(node: &PlannerNode) -> Vec<u8> {
	let mut w = ByteWriter::new();
	match node {
		PlannerNode::Jobs(jobs) => {
			w.write_u32(jobs.len() as u32);
			for job in jobs {
				w.write_string(&job.description);
				w.write_u32(job.priority);
				w.write_bool(job.completed);
				w.write_string(&job.assignee);
			}
		}
		PlannerNode::Goals(items) => encode_string_list(&mut w, items),
		PlannerNode::Ideas(items) => encode_string_list(&mut w, items),
		PlannerNode::Deps(items) => encode_string_list(&mut w, items),
		PlannerNode::Implemented(items) => encode_string_list(&mut w, items),
		PlannerNode::Research(items) => encode_string_list(&mut w, items),
		PlannerNode::Root(s) | PlannerNode::SubPlan(s) | PlannerNode::Strategy(s) | PlannerNode::Notes(s) => {
			w.write_string(s);
		}
	}
	w.into_bytes()
}

pub fn decode(tag: &str, payload: &[u8]) -> Result<PlannerNode, VfsError> {
	let mut r = ByteReader::new(payload);
	let node = match tag {
		"planner.jobs" => {
			let count = r.read_u32()? as usize;
			let mut jobs = Vec::with_capacity(count);
			for _ in 0..count {
				let description = r.read_string()?;
				let priority = r.read_u32()?;
				let completed = r.read_bool()?;
				let assignee = r.read_string()?;
				jobs.push(Job { description, priority, completed, assignee });
			}
			PlannerNode::Jobs(jobs)
		}
		"planner.goals" => PlannerNode::Goals(decode_string_list(&mut r)?),
		"planner.ideas" => PlannerNode::Ideas(decode_string_list(&mut r)?),
		"planner.deps" => PlannerNode::Deps(decode_string_list(&mut r)?),
		"planner.implemented" => PlannerNode::Implemented(decode_string_list(&mut r)?),
		"planner.research" => PlannerNode::Research(decode_string_list(&mut r)?),
		"planner.root" => PlannerNode::Root(r.read_string()?),
		"planner.sub_plan" => PlannerNode::SubPlan(r.read_string()?),
		"planner.strategy" => PlannerNode::Strategy(r.read_string()?),
		"planner.notes" => PlannerNode::Notes(r.read_string()?),
		other => return Err(VfsError::format(format!("unknown planner type tag `{other}`"))),
	};
	r.finish()?;
	Ok(node)
}

pub fn type_tag(node: &PlannerNode) -> &'static str {
	match node {
		PlannerNode::Jobs(_) => "planner.jobs",
		PlannerNode::Goals(_) => "planner.goals",
		PlannerNode::Ideas(_) => "planner.ideas",
		PlannerNode::Deps(_) => "planner.deps",
		PlannerNode::Implemented(_) => "planner.implemented",
		PlannerNode::Research(_) => "planner.research",
		PlannerNode::Root(_) => "planner.root",
		PlannerNode::SubPlan(_) => "planner.sub_plan",
		PlannerNode::Strategy(_) => "planner.strategy",
		PlannerNode::Notes(_) => "planner.notes",
	}
}

pub fn to_text(node: &PlannerNode) -> String {
	match node {
		PlannerNode::Jobs(jobs) => jobs
			.iter()
			.map(|j| format!("[{}] ({}) {} -- {}", if j.completed { "x" } else { " " }, j.priority, j.description, j.assignee))
			.collect::<Vec<_>>()
			.join("\n"),
		PlannerNode::Goals(items) => to_text_string_list(items),
		PlannerNode::Ideas(items) => to_text_string_list(items),
		PlannerNode::Deps(items) => to_text_string_list(items),
		PlannerNode::Implemented(items) => to_text_string_list(items),
		PlannerNode::Research(items) => to_text_string_list(items),
		PlannerNode::Root(s) | PlannerNode::SubPlan(s) | PlannerNode::Strategy(s) | PlannerNode::Notes(s) => s.clone(),
	}
}

/// Replaces the node's content from a human-edited form. List variants parse
/// one item per line; `Jobs` keeps its existing entries (job lines carry
/// more structure than a plain list can express here) and content variants
/// take the text wholesale.
pub fn from_text(node: &PlannerNode, text: &str) -> PlannerNode {
	match node {
		PlannerNode::Jobs(jobs) => PlannerNode::Jobs(jobs.clone()),
		PlannerNode::Goals(_) => PlannerNode::Goals(from_text_string_list(text)),
		PlannerNode::Ideas(_) => PlannerNode::Ideas(from_text_string_list(text)),
		PlannerNode::Deps(_) => PlannerNode::Deps(from_text_string_list(text)),
		PlannerNode::Implemented(_) => PlannerNode::Implemented(from_text_string_list(text)),
		PlannerNode::Research(_) => PlannerNode::Research(from_text_string_list(text)),
		PlannerNode::Root(_) => PlannerNode::Root(text.to_string()),
		PlannerNode::SubPlan(_) => PlannerNode::SubPlan(text.to_string()),
		PlannerNode::Strategy(_) => PlannerNode::Strategy(text.to_string()),
		PlannerNode::Notes(_) => PlannerNode::Notes(text.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip_jobs() {
		let node = PlannerNode::Jobs(vec![Job {
			description: "ship it".into(),
			priority: 1,
			completed: false,
			assignee: "alice".into(),
		}]);
		let bytes = encode(&node);
		let decoded = decode(type_tag(&node), &bytes).unwrap();
		assert_eq!(decoded, node);
	}

	#[test]
	fn goals_text_roundtrip() {
		let node = PlannerNode::Goals(vec!["a".into(), "b".into()]);
		let text = to_text(&node);
		let reparsed = from_text(&node, &text);
		assert_eq!(reparsed, node);
	}
}
