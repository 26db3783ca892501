//! GCP bearer-token auth for Vertex AI requests, grounded in the
//! `http::auth::gcp` module: lazily build a `google-cloud-auth` credentials object once
//! per process, then ask it for a fresh `Authorization` header value on every call — the
//! crate caches and refreshes the underlying token itself.

use google_cloud_auth::credentials::CacheableResource;
use http::HeaderValue;
use tokio::sync::OnceCell;

use super::AuthContext;
use crate::error::AuthError;

static CREDS: OnceCell<google_cloud_auth::credentials::Credentials> = OnceCell::const_new();

async fn creds(
	token_source: Option<&str>,
) -> Result<&'static google_cloud_auth::credentials::Credentials, AuthError> {
	CREDS
		.get_or_try_init(|| async {
			// `token_source`, when set, names a service-account JSON file on disk;
			// otherwise the ambient application-default-credentials chain is used.
			if let Some(path) = token_source {
				std::env::set_var("GOOGLE_APPLICATION_CREDENTIALS", path);
			}
			google_cloud_auth::credentials::Builder::default().build()
		})
		.await
		.map_err(|e| AuthError::GcpToken(e.to_string()))
}

pub async fn apply(token_source: Option<&str>, ctx: AuthContext<'_>) -> Result<(), AuthError> {
	let creds = creds(token_source).await?;
	let headers = creds
		.headers(http::Extensions::new())
		.await
		.map_err(|e| AuthError::GcpToken(e.to_string()))?;
	let mut map = match headers {
		CacheableResource::New { data, .. } => data,
		CacheableResource::NotModified => {
			return Err(AuthError::GcpToken("expected fresh headers, got not-modified".into()))
		},
	};
	let mut value: HeaderValue = map
		.remove(http::header::AUTHORIZATION)
		.ok_or_else(|| AuthError::GcpToken("credentials provider returned no authorization header".into()))?;
	value.set_sensitive(true);
	ctx.headers.insert(http::header::AUTHORIZATION, value);
	Ok(())
}
