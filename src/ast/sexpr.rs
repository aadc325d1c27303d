//! The S-expression AST value (§4.8). The lexer/parser/evaluator for this
//! language is deliberately out of scope (§1); this module only owns the
//! typed payload and its binary codec so that a holder node can live inside
//! the VFS and round-trip through the container format.

use crate::ast::codec::{ByteReader, ByteWriter};
use crate::error::VfsError;

const TAG_INTEGER: u8 = 0;
const TAG_BOOLEAN: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_SYMBOL: u8 = 3;
const TAG_CONDITIONAL: u8 = 4;
const TAG_LAMBDA: u8 = 5;
const TAG_CALL: u8 = 6;
const TAG_HOLDER: u8 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
	Integer(i64),
	Boolean(bool),
	Str(String),
	Symbol(String),
	Conditional(Box<SExpr>, Box<SExpr>, Box<SExpr>),
	Lambda(Vec<String>, Box<SExpr>),
	Call(Box<SExpr>, Vec<SExpr>),
	Holder(Box<SExpr>),
}

impl SExpr {
	pub fn encode(&self, w: &mut ByteWriter) {
		match self {
			SExpr::Integer(v) => {
				w.write_u8(TAG_INTEGER);
				w.write_i64(*v);
			}
			SExpr::Boolean(v) => {
				w.write_u8(TAG_BOOLEAN);
				w.write_bool(*v);
			}
			SExpr::Str(v) => {
				w.write_u8(TAG_STRING);
				w.write_string(v);
			}
			SExpr::Symbol(v) => {
				w.write_u8(TAG_SYMBOL);
				w.write_string(v);
			}
			SExpr::Conditional(cond, then, els) => {
				w.write_u8(TAG_CONDITIONAL);
				cond.encode(w);
				then.encode(w);
				els.encode(w);
			}
			SExpr::Lambda(params, body) => {
				w.write_u8(TAG_LAMBDA);
				w.write_u32(params.len() as u32);
				for p in params {
					w.write_string(p);
				}
				body.encode(w);
			}
			SExpr::Call(callee, args) => {
				w.write_u8(TAG_CALL);
				callee.encode(w);
				w.write_u32(args.len() as u32);
				for a in args {
					a.encode(w);
				}
			}
			SExpr::Holder(inner) => {
				w.write_u8(TAG_HOLDER);
				inner.encode(w);
			}
		}
	}

	pub fn decode(r: &mut ByteReader) -> Result<SExpr, VfsError> {
		match r.read_u8()? {
			TAG_INTEGER => Ok(SExpr::Integer(r.read_i64()?)),
			TAG_BOOLEAN => Ok(SExpr::Boolean(r.read_bool()?)),
			TAG_STRING => Ok(SExpr::Str(r.read_string()?)),
			TAG_SYMBOL => Ok(SExpr::Symbol(r.read_string()?)),
			TAG_CONDITIONAL => {
				let cond = Box::new(SExpr::decode(r)?);
				let then = Box::new(SExpr::decode(r)?);
				let els = Box::new(SExpr::decode(r)?);
				Ok(SExpr::Conditional(cond, then, els))
			}
			TAG_LAMBDA => {
				let count = r.read_u32()? as usize;
				let mut params = Vec::with_capacity(count);
				for _ in 0..count {
					params.push(r.read_string()?);
				}
				let body = Box::new(SExpr::decode(r)?);
				Ok(SExpr::Lambda(params, body))
			}
			TAG_CALL => {
				let callee = Box::new(SExpr::decode(r)?);
				let count = r.read_u32()? as usize;
				let mut args = Vec::with_capacity(count);
				for _ in 0..count {
					args.push(SExpr::decode(r)?);
				}
				Ok(SExpr::Call(callee, args))
			}
			TAG_HOLDER => Ok(SExpr::Holder(Box::new(SExpr::decode(r)?))),
			other => Err(VfsError::format(format!("unknown s-expression tag {other}"))),
		}
	}

	/// A minimal textual rendering, used by `AstNode::read` for the human
	/// form. This is a printer only: turning typed text back into an
	/// `SExpr` is the job of the (out-of-scope) lexer/parser, so
	/// `AstNode::write` on this variant is documented to reject bytes.
	pub fn to_text(&self) -> String {
		match self {
			SExpr::Integer(v) => v.to_string(),
			SExpr::Boolean(true) => "#t".to_string(),
			SExpr::Boolean(false) => "#f".to_string(),
			SExpr::Str(v) => format!("{v:?}"),
			SExpr::Symbol(v) => v.clone(),
			SExpr::Conditional(c, t, e) => {
				format!("(if {} {} {})", c.to_text(), t.to_text(), e.to_text())
			}
			SExpr::Lambda(params, body) => {
				format!("(lambda ({}) {})", params.join(" "), body.to_text())
			}
			SExpr::Call(callee, args) => {
				let args = args.iter().map(SExpr::to_text).collect::<Vec<_>>().join(" ");
				format!("({} {})", callee.to_text(), args)
			}
			SExpr::Holder(inner) => inner.to_text(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip(e: SExpr) {
		let mut w = ByteWriter::new();
		e.encode(&mut w);
		let bytes = w.into_bytes();
		let mut r = ByteReader::new(&bytes);
		let decoded = SExpr::decode(&mut r).unwrap();
		r.finish().unwrap();
		assert_eq!(decoded, e);
	}

	#[test]
	fn roundtrips_every_variant() {
		roundtrip(SExpr::Integer(42));
		roundtrip(SExpr::Boolean(true));
		roundtrip(SExpr::Str("hi".into()));
		roundtrip(SExpr::Symbol("x".into()));
		roundtrip(SExpr::Conditional(
			Box::new(SExpr::Boolean(true)),
			Box::new(SExpr::Integer(1)),
			Box::new(SExpr::Integer(0)),
		));
		roundtrip(SExpr::Lambda(
			vec!["a".into(), "b".into()],
			Box::new(SExpr::Symbol("a".into())),
		));
		roundtrip(SExpr::Call(
			Box::new(SExpr::Symbol("f".into())),
			vec![SExpr::Integer(1), SExpr::Integer(2)],
		));
		roundtrip(SExpr::Holder(Box::new(SExpr::Integer(9))));
	}

	#[test]
	fn to_text_basics() {
		assert_eq!(SExpr::Integer(5).to_text(), "5");
		assert_eq!(
			SExpr::Call(Box::new(SExpr::Symbol("f".into())), vec![SExpr::Integer(1)]).to_text(),
			"(f 1)"
		);
	}
}
