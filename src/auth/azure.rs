//! Azure OpenAI bearer-token auth. Mirrors the shape of [`super::gcp`] (a process-wide,
//! lazily-built credential that is asked for a fresh token on every call and handles its
//! own caching/refresh), but sourced from `azure_identity`'s default credential chain
//! since this crate doesn't carry a separate Azure-token-fetch path of its own.

use azure_core::credentials::TokenCredential;
use http::HeaderValue;
use tokio::sync::OnceCell;

use super::AuthContext;
use crate::error::AuthError;

const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

static CREDENTIAL: OnceCell<std::sync::Arc<dyn TokenCredential>> = OnceCell::const_new();

async fn credential() -> Result<&'static std::sync::Arc<dyn TokenCredential>, AuthError> {
	CREDENTIAL
		.get_or_try_init(|| async {
			azure_identity::DefaultAzureCredential::new()
				.map(|c| c as std::sync::Arc<dyn TokenCredential>)
				.map_err(|e| AuthError::AzureToken(e.to_string()))
		})
		.await
}

pub async fn apply(token_source: Option<&str>, ctx: AuthContext<'_>) -> Result<(), AuthError> {
	let scope = token_source.unwrap_or(COGNITIVE_SERVICES_SCOPE);
	let credential = credential().await?;
	let token = credential
		.get_token(&[scope], None)
		.await
		.map_err(|e| AuthError::AzureToken(e.to_string()))?;
	let mut value = HeaderValue::from_str(&format!("Bearer {}", token.token.secret()))?;
	value.set_sensitive(true);
	ctx.headers.insert(http::header::AUTHORIZATION, value);
	Ok(())
}
