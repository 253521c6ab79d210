use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::uri::{Authority, Parts, PathAndQuery, Scheme};
use http::{Method, Uri, Version};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::decoder::HeaderSet;
use crate::error::RequestError;

/// A request handed to a [`Handler`](crate::Handler).
///
/// The URI is absolute: the authority is `uri().authority()` and the request
/// target is `uri().path_and_query()`.
pub type Request = http::Request<Body>;

type BoxRead = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Request body, read from the request's data stream.
pub struct Body {
    inner: BoxRead,
}

impl Body {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self {
            inner: Box::new(reader),
        }
    }

    /// A body that reads zero bytes.
    pub fn empty() -> Self {
        Self::new(tokio::io::empty())
    }

    /// Read the whole body into memory.
    pub async fn collect(mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.inner.read_to_end(&mut buf).await?;
        Ok(buf.into())
    }
}

impl AsyncRead for Body {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").finish_non_exhaustive()
    }
}

/// Build a request head from a decoded header block.
///
/// `:method`, `:authority` and `:path` are mandatory. A missing `:scheme`
/// means `https`.
pub fn build_request(headers: &HeaderSet) -> Result<http::Request<()>, RequestError> {
    let method = required(&headers.pseudo.method, ":method")?;
    let authority = required(&headers.pseudo.authority, ":authority")?;
    let path = required(&headers.pseudo.path, ":path")?;

    let method =
        Method::from_bytes(method).map_err(|_| RequestError::InvalidMethod(lossy(method)))?;

    let scheme = match &headers.pseudo.scheme {
        Some(scheme) => Scheme::try_from(scheme.as_ref())
            .map_err(|_| RequestError::InvalidScheme(lossy(scheme)))?,
        None => Scheme::HTTPS,
    };

    let authority = Authority::try_from(authority)
        .map_err(|_| RequestError::InvalidAuthority(lossy(authority)))?;

    if !(path.starts_with(b"/") || path == b"*") {
        return Err(RequestError::InvalidPath(lossy(path)));
    }
    let path_and_query =
        PathAndQuery::try_from(path).map_err(|_| RequestError::InvalidPath(lossy(path)))?;

    let mut parts = Parts::default();
    parts.scheme = Some(scheme);
    parts.authority = Some(authority);
    parts.path_and_query = Some(path_and_query);
    let uri = Uri::from_parts(parts).map_err(|_| RequestError::InvalidPath(lossy(path)))?;

    let mut request = http::Request::new(());
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.version_mut() = Version::HTTP_2;

    let header_map = request.headers_mut();
    for (name, value) in &headers.fields {
        let name = HeaderName::from_bytes(name)
            .map_err(|_| RequestError::InvalidHeader(lossy(name)))?;
        let value = HeaderValue::from_bytes(value)
            .map_err(|_| RequestError::InvalidHeader(name.to_string()))?;
        header_map.append(name, value);
    }

    Ok(request)
}

fn required<'a>(value: &'a Option<Bytes>, name: &'static str) -> Result<&'a [u8], RequestError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value.as_ref()),
        _ => Err(RequestError::MissingPseudoHeader(name)),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_set(fields: &[(&str, &str)]) -> HeaderSet {
        HeaderSet::from_fields(
            fields
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec())),
        )
    }

    #[test]
    fn builds_get_request() {
        let set = header_set(&[
            (":method", "GET"),
            (":authority", "example.com"),
            (":path", "/x?y=1"),
            ("accept", "text/html"),
        ]);

        let req = build_request(&set).unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri().authority().unwrap().as_str(), "example.com");
        assert_eq!(req.uri().path_and_query().unwrap().as_str(), "/x?y=1");
        assert_eq!(req.uri().scheme(), Some(&Scheme::HTTPS));
        assert_eq!(req.version(), Version::HTTP_2);
        assert_eq!(req.headers()["accept"], "text/html");
    }

    #[test]
    fn keeps_explicit_scheme_and_duplicate_fields() {
        let set = header_set(&[
            (":method", "POST"),
            (":scheme", "http"),
            (":authority", "localhost:6121"),
            (":path", "/upload"),
            ("cookie", "a=1"),
            ("cookie", "b=2"),
        ]);

        let req = build_request(&set).unwrap();
        assert_eq!(req.uri().to_string(), "http://localhost:6121/upload");
        let cookies: Vec<_> = req.headers().get_all("cookie").iter().collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn missing_mandatory_pseudo_headers() {
        let cases = [
            (
                header_set(&[(":authority", "a"), (":path", "/")]),
                ":method",
            ),
            (header_set(&[(":method", "GET"), (":path", "/")]), ":authority"),
            (
                header_set(&[(":method", "GET"), (":authority", "a")]),
                ":path",
            ),
            (
                header_set(&[(":method", "GET"), (":authority", "a"), (":path", "")]),
                ":path",
            ),
        ];

        for (set, missing) in cases {
            assert_eq!(
                build_request(&set).unwrap_err(),
                RequestError::MissingPseudoHeader(missing)
            );
        }
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_method = header_set(&[(":method", "G ET"), (":authority", "a"), (":path", "/")]);
        assert!(matches!(
            build_request(&bad_method),
            Err(RequestError::InvalidMethod(_))
        ));

        let bad_path = header_set(&[(":method", "GET"), (":authority", "a"), (":path", "x")]);
        assert!(matches!(
            build_request(&bad_path),
            Err(RequestError::InvalidPath(_))
        ));

        let bad_authority = header_set(&[
            (":method", "GET"),
            (":authority", "exa mple.com"),
            (":path", "/"),
        ]);
        assert!(matches!(
            build_request(&bad_authority),
            Err(RequestError::InvalidAuthority(_))
        ));

        let bad_header = header_set(&[
            (":method", "GET"),
            (":authority", "a"),
            (":path", "/"),
            ("bad name", "v"),
        ]);
        assert!(matches!(
            build_request(&bad_header),
            Err(RequestError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn empty_body_reads_nothing() {
        let body = Body::empty();
        assert!(body.collect().await.unwrap().is_empty());
    }
}
