//! File-sourced API key auth: read once, trim whitespace, cache, warn (once) rather
//! than fail the whole process if the key looks suspicious — grounded in the
//! `deser_key_from_file` trim-and-wrap pattern, moved from config-deserialize time to
//! first-use time since this crate loads the path from `RuntimeConfig` rather than the
//! key itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use http::HeaderValue;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use super::AuthContext;
use crate::error::AuthError;

static WARNED_EMPTY: Mutex<Option<HashMap<PathBuf, ()>>> = Mutex::new(None);

fn warn_once_if_empty(path: &Path, key: &str) {
	if !key.is_empty() {
		return;
	}
	let mut guard = WARNED_EMPTY.lock();
	let seen = guard.get_or_insert_with(HashMap::new);
	if seen.insert(path.to_path_buf(), ()).is_none() {
		warn!(path = %path.display(), "API key file is empty after trimming");
	}
}

fn load_key(path: &Path) -> Result<SecretString, AuthError> {
	let raw = std::fs::read_to_string(path).map_err(AuthError::KeyFile)?;
	let trimmed = raw.trim().to_string();
	warn_once_if_empty(path, &trimmed);
	Ok(SecretString::from(trimmed))
}

pub async fn apply(secret_path: &Path, ctx: AuthContext<'_>) -> Result<(), AuthError> {
	let key = load_key(secret_path)?;
	let mut value = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))?;
	value.set_sensitive(true);
	ctx.headers.insert(http::header::AUTHORIZATION, value);
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use http::HeaderMap;

	use super::*;

	#[tokio::test]
	async fn trims_whitespace_and_sets_bearer_header() {
		let mut file = tempfile_with_contents("  sk-test-123  \n");
		let mut headers = HeaderMap::new();
		let ctx = AuthContext {
			headers: &mut headers,
			body: b"",
		};
		apply(file.path(), ctx).await.unwrap();
		let value = headers.get(http::header::AUTHORIZATION).unwrap();
		assert_eq!(value.to_str().unwrap(), "Bearer sk-test-123");
		file.close();
	}

	struct TempKeyFile {
		path: PathBuf,
	}
	impl TempKeyFile {
		fn path(&self) -> &Path {
			&self.path
		}
		fn close(self) {
			let _ = std::fs::remove_file(&self.path);
		}
	}

	fn tempfile_with_contents(contents: &str) -> TempKeyFile {
		let path = std::env::temp_dir().join(format!("aigw-test-key-{}", uuid::Uuid::new_v4()));
		let mut f = std::fs::File::create(&path).unwrap();
		f.write_all(contents.as_bytes()).unwrap();
		TempKeyFile { path }
	}
}
