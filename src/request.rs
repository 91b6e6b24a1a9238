//! Turning a streamed request into a bindable one.

use bytes::Bytes;
use http::Request;
use http_body_util::BodyExt;
use tracing::trace;

use crate::error::{Error, Result};

/// Collects the whole body of `req` into memory.
///
/// Binding works on `Request<Bytes>`; call this once per request before
/// binding. Body-size limits belong to the proxy or a body wrapper such as
/// `http_body_util::Limited`.
///
/// ```rust,no_run
/// # async fn handle(req: http::Request<hyper::body::Incoming>) -> tsu_bind::Result<()> {
/// let req = tsu_bind::buffer(req).await?;
/// # Ok(())
/// # }
/// ```
pub async fn buffer<B>(req: Request<B>) -> Result<Request<Bytes>>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let body = body.collect().await.map_err(|e| Error::Body(e.into()))?.to_bytes();
    trace!(bytes = body.len(), "request body buffered");
    Ok(Request::from_parts(parts, body))
}
