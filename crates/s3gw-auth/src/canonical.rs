//! SigV4 canonical request construction.
//!
//! ```text
//! <METHOD>\n
//! <canonical uri>\n
//! <canonical query>\n
//! <canonical headers>\n
//! \n
//! <signed headers>\n
//! <payload hash>
//! ```
//!
//! Paths are decoded and re-encoded segment by segment so a client that sent
//! `%20` and one that sent a raw space produce the same string. Query values
//! are kept byte-for-byte: clients disagree about which characters to escape
//! and the signature covers whatever they actually sent.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Everything except RFC 3986 unreserved characters is escaped.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the canonical request string for a request.
///
/// `exclude_param` drops one query parameter by name; presigned URLs pass
/// `Some("X-Amz-Signature")`.
///
/// # Errors
///
/// Returns [`AuthError::MissingHeader`] when a signed header is absent.
pub fn canonical_request(
    parts: &http::request::Parts,
    signed_headers: &[String],
    payload_hash: &str,
    exclude_param: Option<&str>,
) -> Result<String, AuthError> {
    let method = parts.method.as_str();
    let uri = canonical_uri(parts.uri.path());
    let query = canonical_query(parts.uri.query().unwrap_or(""), exclude_param);
    let headers = canonical_headers(parts, signed_headers)?;
    let signed = signed_headers_string(signed_headers);

    Ok(format!(
        "{method}\n{uri}\n{query}\n{headers}\n\n{signed}\n{payload_hash}"
    ))
}

/// Hex SHA-256 of a canonical request.
#[must_use]
pub fn hash_canonical_request(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Normalize a request path.
///
/// ```
/// use s3gw_auth::canonical::canonical_uri;
///
/// assert_eq!(canonical_uri(""), "/");
/// assert_eq!(canonical_uri("/bkt/a b"), "/bkt/a%20b");
/// assert_eq!(canonical_uri("/bkt/a%20b"), "/bkt/a%20b");
/// ```
#[must_use]
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, URI_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Sort query parameters by name, then value. Values are not re-encoded.
///
/// ```
/// use s3gw_auth::canonical::canonical_query;
///
/// assert_eq!(canonical_query("b=2&a=1&uploads", None), "a=1&b=2&uploads=");
/// assert_eq!(canonical_query("X-Amz-Signature=ff&a=1", Some("X-Amz-Signature")), "a=1");
/// ```
#[must_use]
pub fn canonical_query(query: &str, exclude_param: Option<&str>) -> String {
    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .filter(|(name, _)| exclude_param != Some(*name))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// `name:value` lines for the signed headers, sorted by name.
///
/// Repeated headers are joined with `,`. Values are trimmed and inner runs of
/// whitespace collapsed. `host` falls back to the URI authority, which is
/// where HTTP/2 carries it.
///
/// # Errors
///
/// Returns [`AuthError::MissingHeader`] when a signed header is absent or
/// not valid visible ASCII.
pub fn canonical_headers(
    parts: &http::request::Parts,
    signed_headers: &[String],
) -> Result<String, AuthError> {
    let mut names: Vec<String> = signed_headers.iter().map(|h| h.to_lowercase()).collect();
    names.sort_unstable();
    names.dedup();

    let mut lines = Vec::with_capacity(names.len());
    for name in names {
        let mut values = Vec::new();
        for value in parts.headers.get_all(name.as_str()) {
            let value = value
                .to_str()
                .map_err(|_| AuthError::MissingHeader(name.clone()))?;
            values.push(collapse_whitespace(value.trim()));
        }

        if values.is_empty() {
            match (name.as_str(), parts.uri.authority()) {
                ("host", Some(authority)) => values.push(authority.as_str().to_owned()),
                _ => return Err(AuthError::MissingHeader(name)),
            }
        }

        lines.push(format!("{name}:{}", values.join(",")));
    }

    Ok(lines.join("\n"))
}

/// Semicolon-separated, sorted, lowercase header names.
///
/// ```
/// use s3gw_auth::canonical::signed_headers_string;
///
/// let signed = vec!["x-amz-date".to_owned(), "Host".to_owned()];
/// assert_eq!(signed_headers_string(&signed), "host;x-amz-date");
/// ```
#[must_use]
pub fn signed_headers_string(signed_headers: &[String]) -> String {
    let mut sorted: Vec<String> = signed_headers.iter().map(|h| h.to_lowercase()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(";")
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn signed(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    fn aws_example_parts() -> http::request::Parts {
        http::Request::builder()
            .method("GET")
            .uri("/test.txt")
            .header("host", "examplebucket.s3.amazonaws.com")
            .header("range", "bytes=0-9")
            .header("x-amz-content-sha256", EMPTY_SHA256)
            .header("x-amz-date", "20130524T000000Z")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_should_build_canonical_request_matching_aws_example() {
        let parts = aws_example_parts();
        let canonical = canonical_request(
            &parts,
            &signed(&["host", "range", "x-amz-content-sha256", "x-amz-date"]),
            EMPTY_SHA256,
            None,
        )
        .unwrap();

        let expected = "GET\n\
                        /test.txt\n\
                        \n\
                        host:examplebucket.s3.amazonaws.com\n\
                        range:bytes=0-9\n\
                        x-amz-content-sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\
                        x-amz-date:20130524T000000Z\n\
                        \n\
                        host;range;x-amz-content-sha256;x-amz-date\n\
                        e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(canonical, expected);
        assert_eq!(
            hash_canonical_request(&canonical),
            "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972"
        );
    }

    #[test]
    fn test_should_fail_when_signed_header_is_missing() {
        let parts = aws_example_parts();
        let result = canonical_headers(&parts, &signed(&["host", "x-amz-meta-color"]));
        assert!(matches!(result, Err(AuthError::MissingHeader(h)) if h == "x-amz-meta-color"));
    }

    #[test]
    fn test_should_take_host_from_authority_when_header_absent() {
        let (parts, ()) = http::Request::builder()
            .uri("http://localhost:7070/bkt")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(
            canonical_headers(&parts, &signed(&["host"])).unwrap(),
            "host:localhost:7070"
        );
    }

    #[test]
    fn test_should_join_repeated_headers_and_collapse_whitespace() {
        let (parts, ()) = http::Request::builder()
            .uri("/")
            .header("x-amz-meta-tag", "  a   b ")
            .header("x-amz-meta-tag", "c")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(
            canonical_headers(&parts, &signed(&["x-amz-meta-tag"])).unwrap(),
            "x-amz-meta-tag:a b,c"
        );
    }

    #[test]
    fn test_should_sort_duplicate_query_keys_by_value() {
        assert_eq!(
            canonical_query("prefix=p&k=b&k=a", None),
            "k=a&k=b&prefix=p"
        );
    }

    #[test]
    fn test_should_preserve_raw_query_values() {
        assert_eq!(
            canonical_query("prefix=a%2Fb&delimiter=/", None),
            "delimiter=/&prefix=a%2Fb"
        );
    }

    #[test]
    fn test_should_not_double_encode_uri_path() {
        assert_eq!(canonical_uri("/bkt/%E2%82%AC"), "/bkt/%E2%82%AC");
        assert_eq!(canonical_uri("/bkt/€"), "/bkt/%E2%82%AC");
        assert_eq!(canonical_uri("/bkt/dir/"), "/bkt/dir/");
    }
}
