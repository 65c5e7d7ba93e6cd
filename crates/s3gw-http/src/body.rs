//! The response body type.
//!
//! Every gateway response is either fully buffered (XML documents, object
//! payloads already read by the backend) or empty (HEAD, 204, 304).

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::Full;

/// Body of every response produced by the gateway.
#[derive(Debug, Default)]
pub enum S3ResponseBody {
    /// Bytes known up front.
    Buffered(Full<Bytes>),
    /// No body at all.
    #[default]
    Empty,
}

impl S3ResponseBody {
    /// Buffered body from anything convertible into [`Bytes`].
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Buffered body from a rendered XML document.
    #[must_use]
    pub fn from_xml(xml: Vec<u8>) -> Self {
        Self::from_bytes(xml)
    }
}

impl http_body::Body for S3ResponseBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full).poll_frame(cx),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body::Body;
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn test_should_report_exact_size() {
        assert_eq!(S3ResponseBody::empty().size_hint().exact(), Some(0));
        assert_eq!(
            S3ResponseBody::from_bytes("hello").size_hint().exact(),
            Some(5)
        );
    }

    #[test]
    fn test_should_end_empty_body_immediately() {
        assert!(S3ResponseBody::default().is_end_stream());
        assert!(!S3ResponseBody::from_xml(b"<a/>".to_vec()).is_end_stream());
    }

    #[tokio::test]
    async fn test_should_yield_buffered_bytes() {
        let collected = S3ResponseBody::from_bytes("payload")
            .collect()
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(collected, Bytes::from_static(b"payload"));
    }
}
