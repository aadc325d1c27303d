//! The C++ builder AST value (§4.8). A minimal structural model sufficient
//! for the builder's own node model (§3) and container round-trip — not the
//! general C++ code emitter, which §1 names as an out-of-scope external
//! collaborator. `to_text` produces straightforward, compilable C++ for the
//! shapes the builder can construct; it does not attempt arbitrary input
//! parsing or multi-dialect codegen.

use crate::ast::codec::{ByteReader, ByteWriter};
use crate::error::VfsError;

#[derive(Debug, Clone, PartialEq)]
pub struct Include {
	pub header: String,
	pub angled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
	pub includes: Vec<Include>,
	/// Names of functions resident as this node's own children; linked by
	/// the container fixup pass (§4.7).
	pub function_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
	pub return_type: String,
	pub name: String,
	pub params: Vec<(String, String)>,
	/// Name of the compound-block child holding the body.
	pub body_child_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
	Expr(Expr),
	Return(Expr),
	Raw(String),
	VarDecl {
		var_type: String,
		name: String,
		init: Option<Expr>,
	},
	/// References a `RangeFor` node resident as a child of the enclosing
	/// compound block, by name.
	RangeForRef(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundBlock {
	pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeFor {
	pub decl: String,
	pub range: String,
	pub body_child_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Identifier(String),
	StringLiteral(String),
	IntegerLiteral(i64),
	Call { callee: Box<Expr>, args: Vec<Expr> },
	BinaryOp { op: String, lhs: Box<Expr>, rhs: Box<Expr> },
	/// `a << b << c` style stream chain (used for `std::cout`).
	StreamOut(Vec<Expr>),
	Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CppNode {
	TranslationUnit(TranslationUnit),
	Function(Function),
	CompoundBlock(CompoundBlock),
	RangeFor(RangeFor),
	Expression(Expr),
}

/// Names of children this node expects to find in its own children map once
/// the container fixup pass has run (§4.7 "Fixup").
pub fn child_names(node: &CppNode) -> Vec<String> {
	match node {
		CppNode::TranslationUnit(tu) => tu.function_names.clone(),
		CppNode::Function(f) => vec![f.body_child_name.clone()],
		CppNode::RangeFor(r) => vec![r.body_child_name.clone()],
		CppNode::CompoundBlock(b) => b
			.statements
			.iter()
			.filter_map(|s| match s {
				Stmt::RangeForRef(name) => Some(name.clone()),
				_ => None,
			})
			.collect(),
		CppNode::Expression(_) => Vec::new(),
	}
}

/// Whether this variant exposes structural children for browsing (§4.2: Ast
/// `is_directory` is "variant-dep.").
pub fn is_directory_kind(node: &CppNode) -> bool {
	matches!(
		node,
		CppNode::TranslationUnit(_) | CppNode::Function(_) | CppNode::CompoundBlock(_) | CppNode::RangeFor(_)
	)
}

// --- escape policy (§4.8) -----------------------------------------------

/// Escapes a string for emission as a C++ string literal: octal triplets for
/// every control byte, trigraph-safe handling of `?`, and no unescaped
/// control bytes left in the output.
pub fn escape_cpp_string(s: &str) -> String {
	let mut out = String::with_capacity(s.len() + 2);
	let bytes = s.as_bytes();
	let mut question_run = 0usize;
	for &b in bytes {
		match b {
			b'"' => {
				out.push_str("\\\"");
				question_run = 0;
			}
			b'\\' => {
				out.push_str("\\\\");
				question_run = 0;
			}
			b'?' => {
				question_run += 1;
				// Trigraphs are exactly two '?' followed by one of a fixed
				// set of characters; breaking every second '?' is
				// sufficient and simple to reason about.
				if question_run >= 2 {
					out.push_str("\\?");
					question_run = 0;
				} else {
					out.push('?');
				}
			}
			0x20..=0x7e => {
				out.push(b as char);
				question_run = 0;
			}
			other => {
				out.push_str(&format!("\\{:03o}", other));
				question_run = 0;
			}
		}
	}
	out
}

impl Expr {
	pub fn to_text(&self) -> String {
		match self {
			Expr::Identifier(name) => name.clone(),
			Expr::StringLiteral(s) => format!("\"{}\"", escape_cpp_string(s)),
			Expr::IntegerLiteral(v) => v.to_string(),
			Expr::Call { callee, args } => {
				let args = args.iter().map(Expr::to_text).collect::<Vec<_>>().join(", ");
				format!("{}({})", callee.to_text(), args)
			}
			Expr::BinaryOp { op, lhs, rhs } => format!("{} {} {}", lhs.to_text(), op, rhs.to_text()),
			Expr::StreamOut(parts) => parts.iter().map(Expr::to_text).collect::<Vec<_>>().join(" << "),
			Expr::Raw(text) => text.clone(),
		}
	}

	fn encode(&self, w: &mut ByteWriter) {
		match self {
			Expr::Identifier(v) => {
				w.write_u8(0);
				w.write_string(v);
			}
			Expr::StringLiteral(v) => {
				w.write_u8(1);
				w.write_string(v);
			}
			Expr::IntegerLiteral(v) => {
				w.write_u8(2);
				w.write_i64(*v);
			}
			Expr::Call { callee, args } => {
				w.write_u8(3);
				callee.encode(w);
				w.write_u32(args.len() as u32);
				for a in args {
					a.encode(w);
				}
			}
			Expr::BinaryOp { op, lhs, rhs } => {
				w.write_u8(4);
				w.write_string(op);
				lhs.encode(w);
				rhs.encode(w);
			}
			Expr::StreamOut(parts) => {
				w.write_u8(5);
				w.write_u32(parts.len() as u32);
				for p in parts {
					p.encode(w);
				}
			}
			Expr::Raw(text) => {
				w.write_u8(6);
				w.write_string(text);
			}
		}
	}

	fn decode(r: &mut ByteReader) -> Result<Expr, VfsError> {
		match r.read_u8()? {
			0 => Ok(Expr::Identifier(r.read_string()?)),
			1 => Ok(Expr::StringLiteral(r.read_string()?)),
			2 => Ok(Expr::IntegerLiteral(r.read_i64()?)),
			3 => {
				let callee = Box::new(Expr::decode(r)?);
				let count = r.read_u32()? as usize;
				let mut args = Vec::with_capacity(count);
				for _ in 0..count {
					args.push(Expr::decode(r)?);
				}
				Ok(Expr::Call { callee, args })
			}
			4 => {
				let op = r.read_string()?;
				let lhs = Box::new(Expr::decode(r)?);
				let rhs = Box::new(Expr::decode(r)?);
				Ok(Expr::BinaryOp { op, lhs, rhs })
			}
			5 => {
				let count = r.read_u32()? as usize;
				let mut parts = Vec::with_capacity(count);
				for _ in 0..count {
					parts.push(Expr::decode(r)?);
				}
				Ok(Expr::StreamOut(parts))
			}
			6 => Ok(Expr::Raw(r.read_string()?)),
			other => Err(VfsError::format(format!("unknown cpp expression tag {other}"))),
		}
	}
}

impl Stmt {
	fn encode(&self, w: &mut ByteWriter) {
		match self {
			Stmt::Expr(e) => {
				w.write_u8(0);
				e.encode(w);
			}
			Stmt::Return(e) => {
				w.write_u8(1);
				e.encode(w);
			}
			Stmt::Raw(text) => {
				w.write_u8(2);
				w.write_string(text);
			}
			Stmt::VarDecl { var_type, name, init } => {
				w.write_u8(3);
				w.write_string(var_type);
				w.write_string(name);
				match init {
					Some(e) => {
						w.write_bool(true);
						e.encode(w);
					}
					None => w.write_bool(false),
				}
			}
			Stmt::RangeForRef(name) => {
				w.write_u8(4);
				w.write_string(name);
			}
		}
	}

	fn decode(r: &mut ByteReader) -> Result<Stmt, VfsError> {
		match r.read_u8()? {
			0 => Ok(Stmt::Expr(Expr::decode(r)?)),
			1 => Ok(Stmt::Return(Expr::decode(r)?)),
			2 => Ok(Stmt::Raw(r.read_string()?)),
			3 => {
				let var_type = r.read_string()?;
				let name = r.read_string()?;
				let init = if r.read_bool()? {
					Some(Expr::decode(r)?)
				} else {
					None
				};
				Ok(Stmt::VarDecl { var_type, name, init })
			}
			4 => Ok(Stmt::RangeForRef(r.read_string()?)),
			other => Err(VfsError::format(format!("unknown cpp statement tag {other}"))),
		}
	}

	fn to_text(&self) -> String {
		match self {
			Stmt::Expr(e) => format!("{};", e.to_text()),
			Stmt::Return(e) => format!("return {};", e.to_text()),
			Stmt::Raw(text) => text.clone(),
			Stmt::VarDecl { var_type, name, init } => match init {
				Some(e) => format!("{var_type} {name} = {};", e.to_text()),
				None => format!("{var_type} {name};"),
			},
			Stmt::RangeForRef(name) => format!("/* range-for: {name} */"),
		}
	}
}

pub fn encode(node: &CppNode) -> Vec<u8> {
	let mut w = ByteWriter::new();
	match node {
		CppNode::TranslationUnit(tu) => {
			w.write_u32(tu.includes.len() as u32);
			for inc in &tu.includes {
				w.write_string(&inc.header);
				w.write_bool(inc.angled);
			}
			w.write_u32(tu.function_names.len() as u32);
			for name in &tu.function_names {
				w.write_string(name);
			}
		}
		CppNode::Function(f) => {
			w.write_string(&f.return_type);
			w.write_string(&f.name);
			w.write_u32(f.params.len() as u32);
			for (ty, name) in &f.params {
				w.write_string(ty);
				w.write_string(name);
			}
			w.write_string(&f.body_child_name);
		}
		CppNode::CompoundBlock(b) => {
			w.write_u32(b.statements.len() as u32);
			for s in &b.statements {
				s.encode(&mut w);
			}
		}
		CppNode::RangeFor(rf) => {
			w.write_string(&rf.decl);
			w.write_string(&rf.range);
			w.write_string(&rf.body_child_name);
		}
		CppNode::Expression(e) => e.encode(&mut w),
	}
	w.into_bytes()
}

pub fn decode(tag: &str, payload: &[u8]) -> Result<CppNode, VfsError> {
	let mut r = ByteReader::new(payload);
	let node = match tag {
		"cpp.translation_unit" => {
			let include_count = r.read_u32()? as usize;
			let mut includes = Vec::with_capacity(include_count);
			for _ in 0..include_count {
				let header = r.read_string()?;
				let angled = r.read_bool()?;
				includes.push(Include { header, angled });
			}
			let function_count = r.read_u32()? as usize;
			let mut function_names = Vec::with_capacity(function_count);
			for _ in 0..function_count {
				function_names.push(r.read_string()?);
			}
			CppNode::TranslationUnit(TranslationUnit { includes, function_names })
		}
		"cpp.function" => {
			let return_type = r.read_string()?;
			let name = r.read_string()?;
			let param_count = r.read_u32()? as usize;
			let mut params = Vec::with_capacity(param_count);
			for _ in 0..param_count {
				let ty = r.read_string()?;
				let name = r.read_string()?;
				params.push((ty, name));
			}
			let body_child_name = r.read_string()?;
			CppNode::Function(Function { return_type, name, params, body_child_name })
		}
		"cpp.compound_block" => {
			let count = r.read_u32()? as usize;
			let mut statements = Vec::with_capacity(count);
			for _ in 0..count {
				statements.push(Stmt::decode(&mut r)?);
			}
			CppNode::CompoundBlock(CompoundBlock { statements })
		}
		"cpp.range_for" => {
			let decl = r.read_string()?;
			let range = r.read_string()?;
			let body_child_name = r.read_string()?;
			CppNode::RangeFor(RangeFor { decl, range, body_child_name })
		}
		"cpp.expression" => CppNode::Expression(Expr::decode(&mut r)?),
		other => return Err(VfsError::format(format!("unknown cpp type tag `{other}`"))),
	};
	r.finish()?;
	Ok(node)
}

pub fn type_tag(node: &CppNode) -> &'static str {
	match node {
		CppNode::TranslationUnit(_) => "cpp.translation_unit",
		CppNode::Function(_) => "cpp.function",
		CppNode::CompoundBlock(_) => "cpp.compound_block",
		CppNode::RangeFor(_) => "cpp.range_for",
		CppNode::Expression(_) => "cpp.expression",
	}
}

/// Renders a translation unit to C++ source text, given a lookup from child
/// name to the decoded `CppNode` (resolved via the VFS children map).
pub fn render_translation_unit(
	tu: &TranslationUnit,
	lookup_function: impl Fn(&str) -> Option<(Function, CompoundBlock, Vec<(String, RangeFor, CompoundBlock)>)>,
) -> Result<String, VfsError> {
	let mut out = String::new();
	for inc in &tu.includes {
		if inc.angled {
			out.push_str(&format!("#include <{}>\n", inc.header));
		} else {
			out.push_str(&format!("#include \"{}\"\n", inc.header));
		}
	}
	if !tu.includes.is_empty() {
		out.push('\n');
	}
	for name in &tu.function_names {
		let (function, body, range_fors) = lookup_function(name)
			.ok_or_else(|| VfsError::format(format!("missing fixup target for function `{name}`")))?;
		out.push_str(&render_function(&function, &body, &range_fors));
		out.push('\n');
	}
	Ok(out)
}

fn render_function(f: &Function, body: &CompoundBlock, range_fors: &[(String, RangeFor, CompoundBlock)]) -> String {
	let params = f
		.params
		.iter()
		.map(|(ty, name)| format!("{ty} {name}"))
		.collect::<Vec<_>>()
		.join(", ");
	let mut out = format!("{} {}({}) {{\n", f.return_type, f.name, params);
	for stmt in &body.statements {
		match stmt {
			Stmt::RangeForRef(name) => {
				if let Some((_, rf, inner)) = range_fors.iter().find(|(n, _, _)| n == name) {
					out.push_str(&format!(
						"\tfor ({} : {}) {{\n",
						rf.decl, rf.range
					));
					for inner_stmt in &inner.statements {
						out.push_str(&format!("\t\t{}\n", inner_stmt.to_text()));
					}
					out.push_str("\t}\n");
				}
			}
			other => out.push_str(&format!("\t{}\n", other.to_text())),
		}
	}
	out.push_str("}\n");
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn escape_handles_control_bytes_and_trigraphs() {
		let escaped = escape_cpp_string("a\tb??=c\"d\\e");
		assert!(!escaped.bytes().any(|b| b < 0x20));
		assert!(escaped.contains("\\t"));
		assert!(escaped.contains("\\?"));
		assert!(escaped.contains("\\\""));
		assert!(escaped.contains("\\\\"));
	}

	#[test]
	fn roundtrip_function() {
		let node = CppNode::Function(Function {
			return_type: "int".into(),
			name: "main".into(),
			params: vec![],
			body_child_name: "body".into(),
		});
		let bytes = encode(&node);
		let decoded = decode(type_tag(&node), &bytes).unwrap();
		assert_eq!(decoded, node);
	}

	#[test]
	fn roundtrip_compound_block_with_range_for_ref() {
		let node = CppNode::CompoundBlock(CompoundBlock {
			statements: vec![
				Stmt::Return(Expr::IntegerLiteral(0)),
				Stmt::RangeForRef("loop0".into()),
			],
		});
		let bytes = encode(&node);
		let decoded = decode(type_tag(&node), &bytes).unwrap();
		assert_eq!(decoded, node);
		assert_eq!(child_names(&node), vec!["loop0".to_string()]);
	}

	#[test]
	fn render_main_prints_and_returns() {
		let tu = TranslationUnit {
			includes: vec![Include { header: "iostream".into(), angled: true }],
			function_names: vec!["main".into()],
		};
		let function = Function {
			return_type: "int".into(),
			name: "main".into(),
			params: vec![],
			body_child_name: "body".into(),
		};
		let body = CompoundBlock {
			statements: vec![
				Stmt::Expr(Expr::StreamOut(vec![
					Expr::Identifier("std::cout".into()),
					Expr::StringLiteral("x".into()),
				])),
				Stmt::Return(Expr::IntegerLiteral(0)),
			],
		};
		let text = render_translation_unit(&tu, |name| {
			if name == "main" {
				Some((function.clone(), body.clone(), Vec::new()))
			} else {
				None
			}
		})
		.unwrap();
		assert!(text.contains("int main() {"));
		assert!(text.contains("std::cout << \"x\""));
		assert!(text.contains("return 0;"));
	}
}
