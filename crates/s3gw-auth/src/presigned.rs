//! Presigned URL verification.
//!
//! The credential travels in the query string (`X-Amz-Algorithm`,
//! `X-Amz-Credential`, `X-Amz-Date`, `X-Amz-Expires`, `X-Amz-SignedHeaders`,
//! `X-Amz-Signature`) and the payload is always `UNSIGNED-PAYLOAD`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::canonical::{canonical_request, hash_canonical_request};
use crate::credentials::CredentialProvider;
use crate::error::AuthError;
use crate::sigv4::{
    AuthResult, CredentialScope, SUPPORTED_ALGORITHM, UNSIGNED_PAYLOAD, build_string_to_sign,
    compute_signature, derive_signing_key, parse_amz_date, parse_credential, signatures_match,
};

/// Longest validity a presigned URL may request: seven days.
pub const MAX_EXPIRES_SECS: u64 = 7 * 24 * 60 * 60;

const SIGNATURE_PARAM: &str = "X-Amz-Signature";

/// Parsed presigned URL query parameters.
#[derive(Debug, Clone)]
pub struct ParsedPresignedParams {
    /// The access key ID.
    pub access_key_id: String,
    /// Credential scope.
    pub scope: CredentialScope,
    /// `X-Amz-Date` as sent.
    pub timestamp: String,
    /// Validity in seconds.
    pub expires: u64,
    /// Signed header names.
    pub signed_headers: Vec<String>,
    /// Hex-encoded signature.
    pub signature: String,
}

/// Whether the query string carries a presigned credential.
#[must_use]
pub fn is_presigned(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .any(|p| p.split_once('=').map_or(p, |(k, _)| k) == "X-Amz-Credential")
    })
}

/// Parse presigned URL query parameters.
///
/// # Errors
///
/// Returns [`AuthError::MissingQueryParam`] for an absent parameter,
/// [`AuthError::UnsupportedAlgorithm`], [`AuthError::InvalidCredential`] or
/// [`AuthError::InvalidExpires`] for bad values.
pub fn parse_presigned_params(query: &str) -> Result<ParsedPresignedParams, AuthError> {
    let params: HashMap<&str, String> = query
        .split('&')
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            Some((
                key,
                percent_encoding::percent_decode_str(value)
                    .decode_utf8_lossy()
                    .into_owned(),
            ))
        })
        .collect();

    let required = |name: &str| {
        params
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::MissingQueryParam(name.to_owned()))
    };

    let algorithm = required("X-Amz-Algorithm")?;
    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm));
    }

    let (access_key_id, scope) = parse_credential(&required("X-Amz-Credential")?)?;
    let timestamp = required("X-Amz-Date")?;
    let expires_raw = required("X-Amz-Expires")?;
    let expires: u64 = expires_raw
        .parse()
        .map_err(|_| AuthError::InvalidExpires(expires_raw.clone()))?;
    if expires == 0 || expires > MAX_EXPIRES_SECS {
        return Err(AuthError::InvalidExpires(expires_raw));
    }

    Ok(ParsedPresignedParams {
        access_key_id,
        scope,
        timestamp,
        expires,
        signed_headers: required("X-Amz-SignedHeaders")?
            .split(';')
            .map(ToOwned::to_owned)
            .collect(),
        signature: required(SIGNATURE_PARAM)?,
    })
}

/// Reject a URL whose `X-Amz-Date + X-Amz-Expires` is before `now`, or
/// whose date lies further in the future than `max_skew`.
///
/// # Errors
///
/// Returns [`AuthError::RequestExpired`], [`AuthError::RequestTimeTooSkewed`]
/// or [`AuthError::InvalidDate`].
pub fn check_expiration(
    timestamp: &str,
    expires: u64,
    now: DateTime<Utc>,
    max_skew: Duration,
) -> Result<(), AuthError> {
    let signed_at = parse_amz_date(timestamp)?;
    if signed_at - now > max_skew {
        return Err(AuthError::RequestTimeTooSkewed {
            request_time: signed_at,
            server_time: now,
        });
    }

    let lifetime =
        Duration::seconds(i64::try_from(expires).map_err(|_| AuthError::RequestExpired)?);
    if now > signed_at + lifetime {
        return Err(AuthError::RequestExpired);
    }
    Ok(())
}

/// Verify a presigned URL request.
///
/// # Errors
///
/// Returns an [`AuthError`] describing the first check that failed.
pub fn verify_presigned(
    parts: &http::request::Parts,
    credential_provider: &dyn CredentialProvider,
    now: DateTime<Utc>,
    max_skew: Duration,
) -> Result<AuthResult, AuthError> {
    let parsed = parse_presigned_params(parts.uri.query().unwrap_or(""))?;

    check_expiration(&parsed.timestamp, parsed.expires, now, max_skew)?;

    let secret_key = credential_provider.get_secret_key(&parsed.access_key_id)?;

    debug!(
        access_key_id = %parsed.access_key_id,
        expires = parsed.expires,
        "verifying presigned URL"
    );

    let canonical = canonical_request(
        parts,
        &parsed.signed_headers,
        UNSIGNED_PAYLOAD,
        Some(SIGNATURE_PARAM),
    )?;
    let string_to_sign = build_string_to_sign(
        &parsed.timestamp,
        &parsed.scope.to_scope_string(),
        &hash_canonical_request(&canonical),
    );
    let signing_key = derive_signing_key(&secret_key, &parsed.scope);
    let expected = compute_signature(&signing_key, &string_to_sign);

    if !signatures_match(&parsed.signature, &expected) {
        debug!(canonical, string_to_sign, "presigned signature mismatch");
        return Err(AuthError::SignatureDoesNotMatch);
    }

    Ok(AuthResult {
        is_admin: credential_provider.is_admin(&parsed.access_key_id),
        access_key_id: parsed.access_key_id,
        region: parsed.scope.region,
        service: parsed.scope.service,
        signed_headers: parsed.signed_headers,
    })
}
