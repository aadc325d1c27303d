//! The AST node variant (§3 "AST"): typed subtrees — S-expression holder,
//! C++ builder node, or planner node — living inside the VFS alongside
//! plain files and directories.

pub mod codec;
pub mod cpp;
pub mod planner;
pub mod sexpr;

use crate::error::{VfsError, VfsResult};
use crate::node::{ArcNode, Node, NodeKind, WeakNode};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub enum AstValue {
	SExpr(sexpr::SExpr),
	Cpp(cpp::CppNode),
	Planner(planner::PlannerNode),
}

impl AstValue {
	pub fn type_tag(&self) -> &'static str {
		match self {
			AstValue::SExpr(_) => "sexpr",
			AstValue::Cpp(node) => cpp::type_tag(node),
			AstValue::Planner(node) => planner::type_tag(node),
		}
	}

	pub fn is_directory_kind(&self) -> bool {
		match self {
			AstValue::SExpr(_) => false,
			AstValue::Cpp(node) => cpp::is_directory_kind(node),
			AstValue::Planner(_) => false,
		}
	}

	/// Names this node expects to find among its own children once the
	/// container fixup pass has run.
	pub fn expected_child_names(&self) -> Vec<String> {
		match self {
			AstValue::SExpr(_) | AstValue::Planner(_) => Vec::new(),
			AstValue::Cpp(node) => cpp::child_names(node),
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		match self {
			AstValue::SExpr(e) => {
				let mut w = codec::ByteWriter::new();
				e.encode(&mut w);
				w.into_bytes()
			}
			AstValue::Cpp(node) => cpp::encode(node),
			AstValue::Planner(node) => planner::encode(node),
		}
	}

	pub fn decode(type_tag: &str, payload: &[u8]) -> VfsResult<AstValue> {
		if type_tag == "sexpr" {
			let mut r = codec::ByteReader::new(payload);
			let e = sexpr::SExpr::decode(&mut r)?;
			r.finish()?;
			return Ok(AstValue::SExpr(e));
		}
		if let Some(stripped) = type_tag.strip_prefix("cpp.") {
			let _ = stripped;
			return Ok(AstValue::Cpp(cpp::decode(type_tag, payload)?));
		}
		if type_tag.starts_with("planner.") {
			return Ok(AstValue::Planner(planner::decode(type_tag, payload)?));
		}
		Err(VfsError::format(format!("unknown ast type tag `{type_tag}`")))
	}
}

/// Binds an [`AstValue`] into the node hierarchy, exposing it through the
/// four universal node operations (§3, §4.2).
#[derive(Debug)]
pub struct AstNode {
	name: RwLock<String>,
	parent: RwLock<WeakNode>,
	value: RwLock<AstValue>,
	children: RwLock<BTreeMap<String, ArcNode>>,
}

impl AstNode {
	pub fn new(name: impl Into<String>, parent: WeakNode, value: AstValue) -> Self {
		Self {
			name: RwLock::new(name.into()),
			parent: RwLock::new(parent),
			value: RwLock::new(value),
			children: RwLock::new(BTreeMap::new()),
		}
	}

	pub fn new_arc(name: impl Into<String>, parent: WeakNode, value: AstValue) -> ArcNode {
		std::sync::Arc::new(Self::new(name, parent, value))
	}

	pub fn value(&self) -> AstValue {
		self.value.read().expect("poisoned lock").clone()
	}

	pub fn set_value(&self, value: AstValue) {
		*self.value.write().expect("poisoned lock") = value;
	}

	/// Attaches an already-constructed child node, used by the container
	/// reader's fixup pass to link late-bound references by name.
	pub fn attach_existing_child(&self, name: impl Into<String>, node: ArcNode) {
		self.children.write().expect("poisoned lock").insert(name.into(), node);
	}

	pub fn get_child(&self, name: &str) -> Option<ArcNode> {
		self.children.read().expect("poisoned lock").get(name).cloned()
	}

	/// Renders the human-readable form described by §4.2's "serialize form".
	pub fn to_text(&self) -> VfsResult<String> {
		let value = self.value();
		match &value {
			AstValue::SExpr(e) => Ok(e.to_text()),
			AstValue::Planner(node) => Ok(planner::to_text(node)),
			AstValue::Cpp(cpp::CppNode::TranslationUnit(tu)) => {
				let children = self.children.read().expect("poisoned lock");
				cpp::render_translation_unit(tu, |name| {
					let function_node = children.get(name)?.downcast_ref::<AstNode>().ok()?;
					let AstValue::Cpp(cpp::CppNode::Function(function)) = function_node.value() else {
						return None;
					};
					let body_node = function_node.get_child(&function.body_child_name)?;
					let body_node = body_node.downcast_ref::<AstNode>().ok()?;
					let AstValue::Cpp(cpp::CppNode::CompoundBlock(body)) = body_node.value() else {
						return None;
					};
					let mut range_fors = Vec::new();
					for stmt in &body.statements {
						if let cpp::Stmt::RangeForRef(ref_name) = stmt {
							if let Some(rf_node) = body_node.get_child(ref_name) {
								if let Ok(rf_node) = rf_node.downcast_ref::<AstNode>() {
									if let AstValue::Cpp(cpp::CppNode::RangeFor(rf)) = rf_node.value() {
										if let Some(inner) = rf_node.get_child(&rf.body_child_name) {
											if let Ok(inner) = inner.downcast_ref::<AstNode>() {
												if let AstValue::Cpp(cpp::CppNode::CompoundBlock(inner_block)) = inner.value() {
													range_fors.push((ref_name.clone(), rf, inner_block));
												}
											}
										}
									}
								}
							}
						}
					}
					Some((function, body, range_fors))
				})
			}
			AstValue::Cpp(other) => Ok(format!("{other:?}")),
		}
	}

	/// Replaces content from a human-edited form. Open Question (a) of §9:
	/// the source is inconsistent about whether AST `write` must accept
	/// arbitrary bytes; this crate documents a per-variant answer. Planner
	/// content is editable as plain text; the S-expression holder and the
	/// C++ builder are mutated only through their own builder operations
	/// (the former because its text form requires the out-of-scope
	/// lexer/parser, the latter because arbitrary text cannot be
	/// re-attached to the builder's structural children), so both reject
	/// raw byte writes with a Format error.
	pub fn write_text(&self, bytes: &[u8]) -> VfsResult<()> {
		let text = std::str::from_utf8(bytes)
			.map_err(|e| VfsError::format(format!("ast write is not valid utf-8: {e}")))?;
		let value = self.value();
		match &value {
			AstValue::Planner(node) => {
				self.set_value(AstValue::Planner(planner::from_text(node, text)));
				Ok(())
			}
			AstValue::SExpr(_) => Err(VfsError::format(
				"s-expression nodes are not writable as raw text (parser is out of scope); use the builder commands",
			)),
			AstValue::Cpp(_) => Err(VfsError::format(
				"c++ builder nodes are not writable as raw text; use the builder commands",
			)),
		}
	}
}

impl Node for AstNode {
	fn kind(&self) -> NodeKind {
		NodeKind::Ast
	}

	fn name(&self) -> String {
		self.name.read().expect("poisoned lock").clone()
	}

	fn set_name(&self, name: String) {
		*self.name.write().expect("poisoned lock") = name;
	}

	fn parent(&self) -> WeakNode {
		self.parent.read().expect("poisoned lock").clone()
	}

	fn set_parent(&self, parent: WeakNode) {
		*self.parent.write().expect("poisoned lock") = parent;
	}

	fn is_directory(&self) -> bool {
		self.value().is_directory_kind()
	}

	fn read(&self) -> VfsResult<Vec<u8>> {
		Ok(self.to_text()?.into_bytes())
	}

	fn write(&self, bytes: &[u8]) -> VfsResult<()> {
		self.write_text(bytes)
	}

	fn children(&self) -> VfsResult<BTreeMap<String, ArcNode>> {
		Ok(self.children.read().expect("poisoned lock").clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::unparented;

	#[test]
	fn sexpr_write_is_rejected() {
		let node = AstNode::new("x", unparented(), AstValue::SExpr(sexpr::SExpr::Integer(1)));
		assert!(node.write(b"2").is_err());
	}

	#[test]
	fn planner_notes_are_editable() {
		let node = AstNode::new(
			"notes",
			unparented(),
			AstValue::Planner(planner::PlannerNode::Notes("old".into())),
		);
		node.write(b"new").unwrap();
		assert_eq!(node.read().unwrap(), b"new");
	}

	#[test]
	fn translation_unit_renders_with_fixed_up_children() {
		let tu = AstNode::new_arc(
			"tu",
			unparented(),
			AstValue::Cpp(cpp::CppNode::TranslationUnit(cpp::TranslationUnit {
				includes: vec![cpp::Include { header: "iostream".into(), angled: true }],
				function_names: vec!["main".into()],
			})),
		);
		let function = AstNode::new_arc(
			"main",
			unparented(),
			AstValue::Cpp(cpp::CppNode::Function(cpp::Function {
				return_type: "int".into(),
				name: "main".into(),
				params: vec![],
				body_child_name: "body".into(),
			})),
		);
		let body = AstNode::new_arc(
			"body",
			unparented(),
			AstValue::Cpp(cpp::CppNode::CompoundBlock(cpp::CompoundBlock {
				statements: vec![cpp::Stmt::Return(cpp::Expr::IntegerLiteral(0))],
			})),
		);
		function.downcast_ref::<AstNode>().unwrap().attach_existing_child("body", body);
		tu.downcast_ref::<AstNode>().unwrap().attach_existing_child("main", function);

		let text = tu.downcast_ref::<AstNode>().unwrap().to_text().unwrap();
		assert!(text.contains("int main() {"));
		assert!(text.contains("return 0;"));
	}
}
