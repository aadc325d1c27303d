//! Binary stream primitives shared by every AST variant's encoder/decoder
//! (§4.8): `u8`, little-endian `u32`, little-endian `i64`, and a
//! length-prefixed string (`u32` length + raw bytes). No implicit padding.

use crate::error::VfsError;

#[derive(Debug, Default)]
pub struct ByteWriter {
	buf: Vec<u8>,
}

impl ByteWriter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn write_u8(&mut self, v: u8) {
		self.buf.push(v);
	}

	pub fn write_bool(&mut self, v: bool) {
		self.write_u8(v as u8);
	}

	pub fn write_u32(&mut self, v: u32) {
		self.buf.extend_from_slice(&v.to_le_bytes());
	}

	pub fn write_i64(&mut self, v: i64) {
		self.buf.extend_from_slice(&v.to_le_bytes());
	}

	pub fn write_string(&mut self, s: &str) {
		let bytes = s.as_bytes();
		self.write_u32(bytes.len() as u32);
		self.buf.extend_from_slice(bytes);
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.buf
	}
}

pub struct ByteReader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> ByteReader<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		Self { buf, pos: 0 }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8], VfsError> {
		if self.pos + n > self.buf.len() {
			return Err(VfsError::format(format!(
				"ast payload truncated at offset {} (wanted {n} bytes, {} remain)",
				self.pos,
				self.buf.len() - self.pos
			)));
		}
		let slice = &self.buf[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}

	pub fn read_u8(&mut self) -> Result<u8, VfsError> {
		Ok(self.take(1)?[0])
	}

	pub fn read_bool(&mut self) -> Result<bool, VfsError> {
		Ok(self.read_u8()? != 0)
	}

	pub fn read_u32(&mut self) -> Result<u32, VfsError> {
		let b = self.take(4)?;
		Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
	}

	pub fn read_i64(&mut self) -> Result<i64, VfsError> {
		let b = self.take(8)?;
		Ok(i64::from_le_bytes([
			b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
		]))
	}

	pub fn read_string(&mut self) -> Result<String, VfsError> {
		let len = self.read_u32()? as usize;
		let bytes = self.take(len)?;
		String::from_utf8(bytes.to_vec())
			.map_err(|e| VfsError::format(format!("ast payload has non-utf8 string: {e}")))
	}

	/// Call once decoding is logically complete; a nonzero remainder is a
	/// hard "excess bytes" Format error (§4.8: "must end exactly at payload
	/// boundary").
	pub fn finish(self) -> Result<(), VfsError> {
		if self.pos != self.buf.len() {
			return Err(VfsError::format(format!(
				"ast payload has {} excess bytes after decode",
				self.buf.len() - self.pos
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roundtrip_primitives() {
		let mut w = ByteWriter::new();
		w.write_u8(7);
		w.write_bool(true);
		w.write_u32(0xdead_beef);
		w.write_i64(-12345);
		w.write_string("hello");
		let bytes = w.into_bytes();

		let mut r = ByteReader::new(&bytes);
		assert_eq!(r.read_u8().unwrap(), 7);
		assert_eq!(r.read_bool().unwrap(), true);
		assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
		assert_eq!(r.read_i64().unwrap(), -12345);
		assert_eq!(r.read_string().unwrap(), "hello");
		r.finish().unwrap();
	}

	#[test]
	fn truncated_read_is_format_error() {
		let bytes = vec![1, 2];
		let mut r = ByteReader::new(&bytes);
		assert!(r.read_u32().is_err());
	}

	#[test]
	fn excess_bytes_is_format_error() {
		let bytes = vec![1, 2, 3];
		let mut r = ByteReader::new(&bytes);
		r.read_u8().unwrap();
		assert!(r.finish().is_err());
	}
}
