//! Shared helpers: upload ids, entity tags, byte ranges, conditional
//! request matching, continuation tokens and copy-source parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use md5::{Digest, Md5};
use uuid::Uuid;

use s3gw_model::S3Error;

// ---------------------------------------------------------------------------
// IDs
// ---------------------------------------------------------------------------

/// Generate a multipart upload id.
///
/// Upload ids double as staging directory names, so they are restricted to
/// `[0-9a-f]`.
#[must_use]
pub fn generate_upload_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Whether `id` could have come from [`generate_upload_id`].
#[must_use]
pub fn is_valid_upload_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Entity tags
// ---------------------------------------------------------------------------

/// Hex MD5 of `data`.
///
/// # Examples
///
/// ```
/// use s3gw_core::utils::compute_md5;
///
/// assert_eq!(compute_md5(b"hello"), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Quoted hex MD5, the entity tag of a single-part object.
#[must_use]
pub fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", compute_md5(data))
}

/// Composite entity tag of a multipart object: the MD5 over the binary MD5
/// digests of the parts, suffixed with the part count.
///
/// Entries may be quoted; entries that are not hex are skipped.
///
/// # Examples
///
/// ```
/// use s3gw_core::utils::compute_multipart_etag;
///
/// let etag = compute_multipart_etag(&["\"5d41402abc4b2a76b9719d911017c592\""]);
/// assert!(etag.ends_with("-1\""));
/// ```
#[must_use]
pub fn compute_multipart_etag(part_etags: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        if let Ok(bytes) = hex::decode(normalize_etag(etag.as_ref())) {
            combined.extend_from_slice(&bytes);
        }
    }
    format!(
        "\"{}-{}\"",
        hex::encode(Md5::digest(&combined)),
        part_etags.len()
    )
}

/// Strip surrounding double quotes.
#[must_use]
pub fn normalize_etag(etag: &str) -> &str {
    etag.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(etag)
}

// ---------------------------------------------------------------------------
// Byte ranges
// ---------------------------------------------------------------------------

/// A syntactically valid `Range: bytes=` request, not yet resolved against
/// an object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=N-M`
    Bounded {
        /// First byte.
        start: u64,
        /// Last byte, inclusive.
        end: u64,
    },
    /// `bytes=N-`
    From {
        /// First byte.
        start: u64,
    },
    /// `bytes=-N`
    Suffix {
        /// Length of the tail.
        len: u64,
    },
}

impl ByteRange {
    /// Parse a `Range` header value. Only a single range is supported.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` for anything that is not `bytes=` followed by
    /// one range spec.
    pub fn parse(header: &str) -> Result<Self, S3Error> {
        let invalid = || S3Error::new(s3gw_model::S3ErrorCode::InvalidRange);
        let spec = header.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
        if spec.contains(',') {
            return Err(invalid());
        }
        let (first, last) = spec.split_once('-').ok_or_else(invalid)?;
        let number = |s: &str| s.trim().parse::<u64>().map_err(|_| invalid());
        match (first.trim().is_empty(), last.trim().is_empty()) {
            (true, true) => Err(invalid()),
            (true, false) => Ok(Self::Suffix { len: number(last)? }),
            (false, true) => Ok(Self::From {
                start: number(first)?,
            }),
            (false, false) => {
                let (start, end) = (number(first)?, number(last)?);
                if start > end {
                    return Err(invalid());
                }
                Ok(Self::Bounded { start, end })
            }
        }
    }

    /// Resolve against an object of `size` bytes into an inclusive
    /// `(start, end)`; `end` is clamped to the last byte.
    ///
    /// Returns `None` when the range is not satisfiable.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3gw_core::utils::ByteRange;
    ///
    /// let range = ByteRange::parse("bytes=0-499").unwrap();
    /// assert_eq!(range.resolve(1000), Some((0, 499)));
    /// assert_eq!(ByteRange::parse("bytes=-10").unwrap().resolve(5), Some((0, 4)));
    /// ```
    #[must_use]
    pub fn resolve(self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        let last = size - 1;
        match self {
            Self::Bounded { start, end } => (start <= last).then(|| (start, end.min(last))),
            Self::From { start } => (start <= last).then_some((start, last)),
            Self::Suffix { len } => (len > 0).then(|| (size - len.min(size), last)),
        }
    }
}

// ---------------------------------------------------------------------------
// Conditional requests
// ---------------------------------------------------------------------------

/// Whether `etag` satisfies an `If-Match` value (`*` or a list of tags).
#[must_use]
pub fn is_valid_if_match(etag: &str, if_match: &str) -> bool {
    if_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || normalize_etag(candidate) == normalize_etag(etag))
}

/// Whether the object should be returned under an `If-None-Match` value.
/// `false` means the caller answers 304 Not Modified.
#[must_use]
pub fn is_valid_if_none_match(etag: &str, if_none_match: &str) -> bool {
    !is_valid_if_match(etag, if_none_match)
}

// ---------------------------------------------------------------------------
// Continuation tokens
// ---------------------------------------------------------------------------

/// Encode the last returned key or prefix as an opaque token.
///
/// # Examples
///
/// ```
/// use s3gw_core::utils::{decode_continuation_token, encode_continuation_token};
///
/// let token = encode_continuation_token("photos/2024/");
/// assert_eq!(decode_continuation_token(&token).unwrap(), "photos/2024/");
/// ```
#[must_use]
pub fn encode_continuation_token(key: &str) -> String {
    BASE64_STANDARD.encode(key.as_bytes())
}

/// Decode a token produced by [`encode_continuation_token`].
///
/// # Errors
///
/// Returns `InvalidArgument` if the token is not base64 or not UTF-8.
pub fn decode_continuation_token(token: &str) -> Result<String, S3Error> {
    let bytes = BASE64_STANDARD
        .decode(token)
        .map_err(|_| S3Error::invalid_argument("The continuation token provided is incorrect"))?;
    String::from_utf8(bytes)
        .map_err(|_| S3Error::invalid_argument("The continuation token provided is incorrect"))
}

// ---------------------------------------------------------------------------
// Copy source
// ---------------------------------------------------------------------------

/// Split an `x-amz-copy-source` value (`[/]bucket/key`, percent-encoded)
/// into bucket and key.
///
/// # Errors
///
/// Returns `InvalidArgument` when either part is missing, or when a
/// `versionId` is requested.
///
/// # Examples
///
/// ```
/// use s3gw_core::utils::parse_copy_source;
///
/// let (bucket, key) = parse_copy_source("/src-bucket/dir/a%20b.txt").unwrap();
/// assert_eq!(bucket, "src-bucket");
/// assert_eq!(key, "dir/a b.txt");
/// ```
pub fn parse_copy_source(source: &str) -> Result<(String, String), S3Error> {
    let invalid = || S3Error::invalid_argument("Invalid copy source object key");
    let source = source.strip_prefix('/').unwrap_or(source);
    let (path, query) = match source.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (source, None),
    };
    if query.is_some_and(|q| q.starts_with("versionId=")) {
        return Err(S3Error::not_implemented("x-amz-copy-source versionId"));
    }
    let (bucket, key) = path.split_once('/').ok_or_else(invalid)?;
    if bucket.is_empty() || key.is_empty() {
        return Err(invalid());
    }
    let key = percent_encoding::percent_decode_str(key)
        .decode_utf8()
        .map_err(|_| invalid())?
        .into_owned();
    Ok((bucket.to_owned(), key))
}
