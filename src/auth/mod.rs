//! Backend authentication. Grounded in the `http::auth` module of the fork that keeps
//! the ext_proc role this crate plays in mind: request headers (and, for SigV4, the body)
//! are mutated in place before the request leaves for the backend.

pub mod apikey;
pub mod aws;
pub mod azure;
pub mod gcp;

use http::HeaderMap;

use crate::config::BackendAuth as BackendAuthConfig;
use crate::error::AuthError;

/// What an auth handler is allowed to touch. SigV4 needs the body (it's part of the
/// signature); the other schemes only ever add an `Authorization` header.
pub struct AuthContext<'a> {
	pub headers: &'a mut HeaderMap,
	pub body: &'a [u8],
}

/// Apply backend authentication to an outbound request. `None` means the backend
/// config declared no auth and the request goes out exactly as translated.
pub async fn apply(auth: Option<&BackendAuthConfig>, ctx: AuthContext<'_>) -> Result<(), AuthError> {
	match auth {
		None | Some(BackendAuthConfig::None) => Ok(()),
		Some(BackendAuthConfig::ApiKey { secret }) => apikey::apply(secret, ctx).await,
		Some(BackendAuthConfig::AwsCredentials {
			region,
			secret,
			profile,
		}) => aws::apply(region, secret.as_deref(), profile.as_deref(), ctx).await,
		Some(BackendAuthConfig::AzureAccessToken { token_source }) => {
			azure::apply(token_source.as_deref(), ctx).await
		},
		Some(BackendAuthConfig::GcpServiceAccount { token_source }) => {
			gcp::apply(token_source.as_deref(), ctx).await
		},
	}
}
