//! Gzip decompression for upstream bodies arriving with `content-encoding: gzip`.
//! Decompression happens once, fully, on arrival — translators never see compressed
//! bytes. When a body is mutated downstream the `content-encoding` header must be
//! dropped since the replacement body is no longer compressed.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::TranslationError;

pub fn decompress(body: &[u8]) -> Result<Vec<u8>, TranslationError> {
	let mut decoder = GzDecoder::new(body);
	let mut out = Vec::new();
	decoder
		.read_to_end(&mut out)
		.map_err(|e| TranslationError::Framing(format!("gzip decompress failed: {e}")))?;
	Ok(out)
}

pub fn is_gzip_encoded(content_encoding: Option<&str>) -> bool {
	matches!(content_encoding, Some(v) if v.eq_ignore_ascii_case("gzip"))
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use flate2::write::GzEncoder;
	use flate2::Compression;

	use super::*;

	#[test]
	fn round_trips_through_gzip() {
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(b"hello world").unwrap();
		let compressed = encoder.finish().unwrap();
		let decompressed = decompress(&compressed).unwrap();
		assert_eq!(decompressed, b"hello world");
	}

	#[test]
	fn detects_gzip_content_encoding_case_insensitively() {
		assert!(is_gzip_encoded(Some("gzip")));
		assert!(is_gzip_encoded(Some("GZIP")));
		assert!(!is_gzip_encoded(Some("identity")));
		assert!(!is_gzip_encoded(None));
	}

	#[test]
	fn malformed_input_is_a_framing_error() {
		let err = decompress(b"not gzip").unwrap_err();
		assert!(matches!(err, TranslationError::Framing(_)));
	}
}
