//! Structural validation of request parameters.
//!
//! Everything here is syntax only: no function looks at stored state, so the
//! router can reject malformed input before authentication or any backend
//! call. Bucket naming follows the
//! [Amazon S3 rules](https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html).

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::net::Ipv4Addr;

use base64::Engine;
use md5::{Digest, Md5};

use s3gw_model::types::CompletedPart;
use s3gw_model::{S3Error, S3ErrorCode};

/// Maximum object key length in bytes.
pub const MAX_KEY_BYTES: usize = 1024;

/// Maximum total size of user metadata keys plus values.
pub const MAX_METADATA_SIZE: usize = 2048;

/// Highest part number a multipart upload accepts.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Upper bound (and default) for `max-keys`, `max-uploads` and `max-parts`.
pub const MAX_LIST_KEYS: usize = 1000;

const MIN_BUCKET_NAME_LEN: usize = 3;
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Validate a bucket name.
///
/// - 3-63 characters
/// - lowercase letters, digits, hyphens and dots
/// - starts and ends with a letter or digit
/// - no `..`, and no `.-` / `-.` adjacency
/// - not an IPv4 address
/// - no `xn--` prefix, `-s3alias` suffix or `sthree-` prefix
///
/// # Errors
///
/// Returns `InvalidBucketName` if any rule is violated.
///
/// # Examples
///
/// ```
/// use s3gw_core::validation::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-valid-bucket").is_ok());
/// assert!(validate_bucket_name("AB").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> Result<(), S3Error> {
    let reject = |reason: &str| {
        Err(
            S3Error::with_message(S3ErrorCode::InvalidBucketName, reason.to_owned())
                .with_resource(name),
        )
    };
    let len = name.len();

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        return reject("Bucket name must be between 3 and 63 characters long");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return reject(
            "Bucket name must only contain lowercase letters, numbers, hyphens, and dots",
        );
    }
    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[len - 1]) {
        return reject("Bucket name must start and end with a letter or number");
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return reject("Bucket name must not contain adjacent periods or period-hyphen pairs");
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return reject("Bucket name must not be formatted as an IP address");
    }
    if name.starts_with("xn--") || name.starts_with("sthree-") || name.ends_with("-s3alias") {
        return reject("Bucket name uses a reserved prefix or suffix");
    }
    Ok(())
}

/// Validate an object key: 1 to 1024 bytes of UTF-8.
///
/// # Errors
///
/// Returns `InvalidArgument` for an empty key and `KeyTooLongError` for an
/// oversized one.
///
/// # Examples
///
/// ```
/// use s3gw_core::validation::validate_object_key;
///
/// assert!(validate_object_key("photos/2024/image.jpg").is_ok());
/// assert!(validate_object_key("").is_err());
/// ```
pub fn validate_object_key(key: &str) -> Result<(), S3Error> {
    if key.is_empty() {
        return Err(S3Error::invalid_argument("Object key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(S3Error::new(S3ErrorCode::KeyTooLongError).with_resource(key));
    }
    Ok(())
}

/// Validate user metadata size.
///
/// # Errors
///
/// Returns `MetadataTooLarge` when keys plus values exceed 2 KB.
pub fn validate_metadata<S: BuildHasher>(
    metadata: &HashMap<String, String, S>,
) -> Result<(), S3Error> {
    let total: usize = metadata.iter().map(|(k, v)| k.len() + v.len()).sum();
    if total > MAX_METADATA_SIZE {
        return Err(S3Error::with_message(
            S3ErrorCode::MetadataTooLarge,
            format!("Your metadata headers exceed the maximum allowed metadata size ({total} > {MAX_METADATA_SIZE} bytes)"),
        ));
    }
    Ok(())
}

/// Check a `Content-MD5` header against the body. An absent header passes.
///
/// # Errors
///
/// Returns `InvalidDigest` if the header is not a base64 MD5 digest and
/// `BadDigest` if it does not match.
///
/// # Examples
///
/// ```
/// use s3gw_core::validation::validate_content_md5;
///
/// assert!(validate_content_md5(None, b"hello").is_ok());
/// assert!(validate_content_md5(Some("XUFAKrxLKna5cZ2REBfFkg=="), b"hello").is_ok());
/// ```
pub fn validate_content_md5(content_md5: Option<&str>, body: &[u8]) -> Result<(), S3Error> {
    let Some(expected_b64) = content_md5 else {
        return Ok(());
    };
    let expected = base64::engine::general_purpose::STANDARD
        .decode(expected_b64.trim())
        .ok()
        .filter(|bytes| bytes.len() == 16)
        .ok_or_else(|| S3Error::new(S3ErrorCode::InvalidDigest))?;

    if Md5::digest(body).as_slice() != expected.as_slice() {
        return Err(S3Error::new(S3ErrorCode::BadDigest));
    }
    Ok(())
}

/// Validate a part number.
///
/// # Errors
///
/// Returns `InvalidArgument` outside `1..=10000`.
pub fn validate_part_number(part_number: u32) -> Result<(), S3Error> {
    if !(1..=MAX_PART_NUMBER).contains(&part_number) {
        return Err(S3Error::invalid_argument(format!(
            "Part number must be an integer between 1 and {MAX_PART_NUMBER}, inclusive"
        )));
    }
    Ok(())
}

/// Resolve an optional `max-keys` style parameter: default and upper bound
/// are [`MAX_LIST_KEYS`].
///
/// # Errors
///
/// Returns `InvalidArgument` for a negative value.
pub fn resolve_max_keys(requested: Option<i32>, name: &str) -> Result<usize, S3Error> {
    match requested {
        None => Ok(MAX_LIST_KEYS),
        Some(n) if n < 0 => Err(S3Error::invalid_argument(format!(
            "Argument {name} must be an integer between 0 and 2147483647"
        ))),
        Some(n) => Ok(usize::try_from(n).map_or(MAX_LIST_KEYS, |n| n.min(MAX_LIST_KEYS))),
    }
}

/// Validate the part list of a CompleteMultipartUpload request: non-empty
/// and strictly ascending by part number.
///
/// # Errors
///
/// Returns `MalformedXML` for an empty list, `InvalidPartOrder` for a list
/// that is not strictly ascending, and `InvalidArgument` for an out-of-range
/// part number.
pub fn validate_completed_parts(parts: &[CompletedPart]) -> Result<(), S3Error> {
    if parts.is_empty() {
        return Err(S3Error::with_message(
            S3ErrorCode::MalformedXML,
            "The XML you provided was not well-formed or did not validate against our published schema",
        ));
    }
    for part in parts {
        validate_part_number(part.part_number)?;
    }
    if parts
        .windows(2)
        .any(|pair| pair[0].part_number >= pair[1].part_number)
    {
        return Err(S3Error::new(S3ErrorCode::InvalidPartOrder));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: u32) -> CompletedPart {
        CompletedPart {
            part_number: n,
            etag: format!("\"etag-{n}\""),
        }
    }

    #[test]
    fn test_should_accept_valid_bucket_names() {
        for name in ["abc", "my-bucket", "logs.2024", "a1b2c3", "a".repeat(63).as_str()] {
            assert!(validate_bucket_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_should_reject_invalid_bucket_names() {
        for name in [
            "ab",
            "a".repeat(64).as_str(),
            "My-Bucket",
            "under_score",
            "-leading",
            "trailing-",
            "double..dot",
            "dot.-hyphen",
            "192.168.0.1",
            "xn--punycode",
            "sthree-bucket",
            "name-s3alias",
        ] {
            let err = validate_bucket_name(name).unwrap_err();
            assert_eq!(err.code, S3ErrorCode::InvalidBucketName, "{name}");
        }
    }

    #[test]
    fn test_should_bound_object_key_length() {
        assert!(validate_object_key(&"k".repeat(MAX_KEY_BYTES)).is_ok());
        let err = validate_object_key(&"k".repeat(MAX_KEY_BYTES + 1)).unwrap_err();
        assert_eq!(err.code, S3ErrorCode::KeyTooLongError);
        assert_eq!(
            validate_object_key("").unwrap_err().code,
            S3ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn test_should_reject_oversized_metadata() {
        let mut meta = HashMap::new();
        meta.insert("big".to_owned(), "x".repeat(MAX_METADATA_SIZE));
        assert_eq!(
            validate_metadata(&meta).unwrap_err().code,
            S3ErrorCode::MetadataTooLarge
        );
    }

    #[test]
    fn test_should_check_content_md5() {
        let good = base64::engine::general_purpose::STANDARD.encode(Md5::digest(b"body"));
        assert!(validate_content_md5(Some(&good), b"body").is_ok());
        assert_eq!(
            validate_content_md5(Some(&good), b"other").unwrap_err().code,
            S3ErrorCode::BadDigest
        );
        assert_eq!(
            validate_content_md5(Some("not base64!"), b"body").unwrap_err().code,
            S3ErrorCode::InvalidDigest
        );
        assert_eq!(
            validate_content_md5(Some("c2hvcnQ="), b"body").unwrap_err().code,
            S3ErrorCode::InvalidDigest
        );
    }

    #[test]
    fn test_should_bound_part_numbers() {
        assert!(validate_part_number(1).is_ok());
        assert!(validate_part_number(MAX_PART_NUMBER).is_ok());
        assert!(validate_part_number(0).is_err());
        assert!(validate_part_number(MAX_PART_NUMBER + 1).is_err());
    }

    #[test]
    fn test_should_resolve_max_keys() {
        assert_eq!(resolve_max_keys(None, "max-keys").unwrap(), 1000);
        assert_eq!(resolve_max_keys(Some(5), "max-keys").unwrap(), 5);
        assert_eq!(resolve_max_keys(Some(5000), "max-keys").unwrap(), 1000);
        assert!(resolve_max_keys(Some(-1), "max-keys").is_err());
    }

    #[test]
    fn test_should_validate_completed_part_order() {
        assert!(validate_completed_parts(&[part(1), part(2), part(5)]).is_ok());
        assert_eq!(
            validate_completed_parts(&[]).unwrap_err().code,
            S3ErrorCode::MalformedXML
        );
        assert_eq!(
            validate_completed_parts(&[part(2), part(1)]).unwrap_err().code,
            S3ErrorCode::InvalidPartOrder
        );
        assert_eq!(
            validate_completed_parts(&[part(1), part(1)]).unwrap_err().code,
            S3ErrorCode::InvalidPartOrder
        );
    }
}
