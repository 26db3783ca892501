//! AWS SigV4 signing for Bedrock requests, grounded in the `http::auth::aws`
//! module. Region resolution prefers a region carried on the request (set by a
//! translator that read it out of the model ARN or similar) over the backend's static
//! config, matching a "request extensions first, then config" precedence.

use std::time::SystemTime;

use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4::SigningParams;
use tokio::sync::OnceCell;
use tracing::trace;

use super::AuthContext;
use crate::error::AuthError;

static SDK_CONFIG: OnceCell<aws_config::SdkConfig> = OnceCell::const_new();

async fn sdk_config() -> &'static aws_config::SdkConfig {
	SDK_CONFIG
		.get_or_init(|| async { aws_config::load_defaults(BehaviorVersion::latest()).await })
		.await
}

async fn load_credentials(
	secret: Option<&std::path::Path>,
	profile: Option<&str>,
) -> Result<Credentials, AuthError> {
	if let Some(path) = secret {
		// A shared credentials file path was configured explicitly; load just that
		// profile rather than falling back to the ambient provider chain.
		let provider = aws_config::profile::ProfileFileCredentialsProvider::builder()
			.profile_files(
				aws_config::profile::profile_file::ProfileFiles::builder()
					.with_file(aws_config::profile::profile_file::ProfileFileKind::Credentials, path)
					.build(),
			)
			.profile_name(profile.unwrap_or("default"))
			.build();
		return provider
			.provide_credentials()
			.await
			.map_err(|e| AuthError::AwsCredentials(e.to_string()));
	}
	sdk_config()
		.await
		.credentials_provider()
		.ok_or_else(|| AuthError::AwsCredentials("no AWS credentials provider configured".into()))?
		.provide_credentials()
		.await
		.map_err(|e| AuthError::AwsCredentials(e.to_string()))
}

fn resolve_region<'a>(static_region: &'a str, ctx_region: Option<&'a str>) -> &'a str {
	ctx_region.unwrap_or(static_region)
}

/// Sign `ctx` for the `bedrock` service. Idempotent: calling this again on retry
/// re-signs against the (possibly unchanged) headers and body rather than assuming the
/// prior signature is still valid, and recomputes `content-length` to match the body
/// actually being sent.
pub async fn apply(
	region: &str,
	secret: Option<&std::path::Path>,
	profile: Option<&str>,
	ctx: AuthContext<'_>,
) -> Result<(), AuthError> {
	let creds = load_credentials(secret, profile).await?;
	let ctx_region = ctx
		.headers
		.get("x-aigw-aws-region")
		.and_then(|v| v.to_str().ok());
	let region = resolve_region(region, ctx_region).to_string();

	trace!(region = %region, service = "bedrock", "signing AWS request");

	let signing_params: aws_sigv4::sign::v4::SigningParams = SigningParams::builder()
		.identity(&creds.into())
		.region(&region)
		.name("bedrock")
		.time(SystemTime::now())
		.settings(SigningSettings::default())
		.build()
		.map_err(|e| AuthError::Sigv4(e.to_string()))?
		.into();

	let headers: Vec<(String, String)> = ctx
		.headers
		.iter()
		.filter(|(name, _)| *name != http::header::CONTENT_LENGTH)
		.filter_map(|(name, value)| {
			value
				.to_str()
				.ok()
				.map(|v| (name.as_str().to_string(), v.to_string()))
		})
		.collect();

	let signable = SignableRequest::new(
		"POST",
		"https://bedrock-runtime.invalid/",
		headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
		SignableBody::Bytes(ctx.body),
	)
	.map_err(|e| AuthError::Sigv4(e.to_string()))?;

	let signature = sign(signable, &signing_params).map_err(|e| AuthError::Sigv4(e.to_string()))?;

	// Apply the signature to a scratch request built from the same headers, then copy
	// the resulting signed headers (Authorization, x-amz-date, etc.) back into ctx.
	let mut scratch = http::Request::builder().method("POST").uri("https://bedrock-runtime.invalid/");
	for (name, value) in &headers {
		scratch = scratch.header(name, value);
	}
	let mut scratch = scratch
		.body(())
		.map_err(|e| AuthError::Sigv4(e.to_string()))?;
	signature.into_parts().0.apply_to_request_http1x(&mut scratch);

	for (name, value) in scratch.headers() {
		ctx.headers.insert(name.clone(), value.clone());
	}
	ctx.headers.insert(
		http::header::CONTENT_LENGTH,
		http::HeaderValue::from_str(&ctx.body.len().to_string())?,
	);

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_extension_region_wins_over_static_config() {
		assert_eq!(resolve_region("us-east-1", Some("eu-west-1")), "eu-west-1");
	}

	#[test]
	fn falls_back_to_static_region_when_absent() {
		assert_eq!(resolve_region("us-east-1", None), "us-east-1");
	}
}
