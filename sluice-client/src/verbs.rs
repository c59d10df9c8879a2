//! Convenience helpers over any [`Sender`].
//!
//! Each helper builds a request at the default priority, sends it and follows
//! redirects. Use [`follow_redirects`] directly to choose the priority or add
//! headers.

use bytes::Bytes;
use hyper::header::LOCATION;
use hyper::{Method, StatusCode, Uri};
use url::{form_urlencoded, Url};

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::{Body, Response};
use crate::sender::Sender;

/// Redirects followed before giving up with [`Error::TooManyRedirects`].
pub const MAX_REDIRECTS: usize = 10;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Sends a `GET`.
pub async fn get<S: Sender>(sender: &S, url: &str) -> Result<Response> {
    follow_redirects(sender, Request::get(url)?).await
}

/// Sends a `PUT` with `body` as `content_type`.
pub async fn put<S: Sender>(
    sender: &S,
    url: &str,
    content_type: &str,
    body: impl Into<Bytes>,
) -> Result<Response> {
    let request = Request::new(Method::PUT, url)?.with_body(content_type, body)?;
    follow_redirects(sender, request).await
}

/// Sends a `POST` with `body` as `content_type`.
pub async fn post<S: Sender>(
    sender: &S,
    url: &str,
    content_type: &str,
    body: impl Into<Bytes>,
) -> Result<Response> {
    let request = Request::new(Method::POST, url)?.with_body(content_type, body)?;
    follow_redirects(sender, request).await
}

/// Sends a `POST` of `params` encoded as an HTML form.
pub async fn post_params<S, I, K, V>(sender: &S, url: &str, params: I) -> Result<Response>
where
    S: Sender,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let body = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    post(sender, url, FORM_CONTENT_TYPE, body).await
}

/// Sends a `DELETE`.
pub async fn delete<S: Sender>(sender: &S, url: &str) -> Result<Response> {
    follow_redirects(sender, Request::new(Method::DELETE, url)?).await
}

/// Sends `request`, following up to [`MAX_REDIRECTS`] redirects.
///
/// The bodies of intermediate redirect responses are drained so their
/// connections can be reused; the responses themselves stay reachable through
/// [`Response::previous`].
pub async fn follow_redirects<S: Sender>(sender: &S, mut request: Request) -> Result<Response> {
    let mut previous: Option<Response> = None;
    let mut hops = 0;

    loop {
        let mut response = sender.send(request.clone()).await?;
        if let Some(previous) = previous.take() {
            response.set_previous(previous);
        }

        let status = response.status();
        if !is_redirect(status) {
            return Ok(response);
        }
        if hops == MAX_REDIRECTS {
            return Err(Error::TooManyRedirects(MAX_REDIRECTS));
        }

        let location = response
            .header(LOCATION)
            .filter(|l| !l.is_empty())
            .ok_or(Error::MissingLocation(status))?;
        let next = resolve(request.uri(), location)?;
        tracing::debug!(
            from = %request.uri(),
            to = %next,
            status = status.as_u16(),
            "following redirect"
        );

        // Unread bodies pin their connection; drain before moving on.
        let body = std::mem::replace(response.body_mut(), Body::from_bytes(Bytes::new()));
        if let Err(err) = body.bytes().await {
            tracing::debug!(error = %err, "discarding unreadable redirect body");
        }

        request = request.redirected(status, next);
        previous = Some(response);
        hops += 1;
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolves a `Location` value against the URL that produced it.
fn resolve(base: &Uri, location: &str) -> Result<Uri> {
    let invalid = |reason: String| Error::InvalidUrl {
        url: location.to_string(),
        reason,
    };
    let base = Url::parse(&base.to_string()).map_err(|err| invalid(err.to_string()))?;
    let joined = base.join(location).map_err(|err| invalid(err.to_string()))?;
    joined
        .as_str()
        .parse::<Uri>()
        .map_err(|err| invalid(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_locations() {
        let base: Uri = "http://example.org/a/b?q=1".parse().unwrap();
        assert_eq!(resolve(&base, "c").unwrap(), "http://example.org/a/c");
        assert_eq!(resolve(&base, "/root").unwrap(), "http://example.org/root");
        assert_eq!(
            resolve(&base, "http://other.example:8080/x").unwrap(),
            "http://other.example:8080/x"
        );
        assert_eq!(resolve(&base, "//cdn.example/y").unwrap(), "http://cdn.example/y");
    }

    #[test]
    fn only_redirect_statuses_are_followed() {
        for code in [301, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 300, 304, 305, 404] {
            assert!(!is_redirect(StatusCode::from_u16(code).unwrap()));
        }
    }
}
