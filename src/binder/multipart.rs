//! `multipart/form-data` parsing over an already-buffered body.

use bytes::Bytes;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mime;

/// Default bound on the body size accepted by a multipart bind: 32 MiB.
pub const DEFAULT_MAX_MEMORY: usize = 32 << 20;

/// An uploaded file.
///
/// Bind it like any other field: `avatar: FileHeader`, `avatars: Vec<FileHeader>`
/// or `Option<FileHeader>`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct FileHeader {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

impl FileHeader {
    pub(crate) const FIELDS: [&'static str; 3] = ["filename", "content_type", "content"];

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// One part of a multipart body.
#[derive(Debug)]
pub(crate) enum Part {
    Field { name: String, value: String },
    File { name: String, file: FileHeader },
}

/// Splits `body` into its parts.
///
/// Fails when the body exceeds `max_memory`, the content type carries no
/// boundary, or a part is malformed.
pub(crate) fn parse(content_type: &str, body: &Bytes, max_memory: usize) -> Result<Vec<Part>> {
    if body.len() > max_memory {
        return Err(Error::Parse(format!(
            "multipart: body of {} bytes exceeds the {max_memory} byte limit",
            body.len()
        )));
    }
    if mime::essence(content_type) != mime::MULTIPART_FORM {
        return Err(Error::Parse("request Content-Type isn't multipart/form-data".into()));
    }
    let boundary = mime::param(content_type, "boundary")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::Parse("multipart: no boundary in Content-Type".into()))?;

    let delimiter = format!("--{boundary}");
    let next = [&b"\r\n"[..], delimiter.as_bytes()].concat();
    let mut parts = Vec::new();
    let mut rest = match find(body, delimiter.as_bytes()) {
        Some(i) => body.slice(i + delimiter.len()..),
        None => return Err(Error::Parse("multipart: missing opening boundary".into())),
    };

    loop {
        if rest.starts_with(b"--") {
            return Ok(parts);
        }
        rest = strip_crlf(rest)
            .ok_or_else(|| Error::Parse("multipart: expected CRLF after boundary".into()))?;

        let end = find(&rest, &next)
            .ok_or_else(|| Error::Parse("multipart: unterminated part".into()))?;

        parts.push(parse_part(rest.slice(..end))?);
        rest = rest.slice(end + next.len()..);
    }
}

fn parse_part(raw: Bytes) -> Result<Part> {
    let split = find(&raw, b"\r\n\r\n")
        .ok_or_else(|| Error::Parse("multipart: part without header terminator".into()))?;
    let head = std::str::from_utf8(&raw[..split])
        .map_err(|_| Error::Parse("multipart: part headers are not UTF-8".into()))?;
    let content = raw.slice(split + 4..);

    let mut disposition = None;
    let mut content_type = None;
    for line in head.split("\r\n").filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Parse(format!("multipart: malformed header line `{line}`")))?;
        if name.trim().eq_ignore_ascii_case("content-disposition") {
            disposition = Some(value.trim());
        } else if name.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim());
        }
    }

    let disposition =
        disposition.ok_or_else(|| Error::Parse("multipart: part without Content-Disposition".into()))?;
    let name = mime::param(disposition, "name")
        .ok_or_else(|| Error::Parse("multipart: part without a field name".into()))?
        .to_owned();

    // An empty file input arrives as `filename=""`.
    match mime::param(disposition, "filename").filter(|f| !f.is_empty()) {
        Some(filename) => Ok(Part::File {
            name,
            file: FileHeader {
                filename: filename.to_owned(),
                content_type: content_type.unwrap_or("application/octet-stream").to_owned(),
                content,
            },
        }),
        None => Ok(Part::Field { name, value: String::from_utf8_lossy(&content).into_owned() }),
    }
}

fn strip_crlf(bytes: Bytes) -> Option<Bytes> {
    bytes.starts_with(b"\r\n").then(|| bytes.slice(2..))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=XyZ";

    fn body(parts: &[&str]) -> Bytes {
        let mut out = String::new();
        for part in parts {
            out.push_str("--XyZ\r\n");
            out.push_str(part);
            out.push_str("\r\n");
        }
        out.push_str("--XyZ--\r\n");
        Bytes::from(out)
    }

    #[test]
    fn splits_fields_and_files() {
        let body = body(&[
            "Content-Disposition: form-data; name=\"name\"\r\n\r\njohn",
            "Content-Disposition: form-data; name=\"avatar\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\nworld",
        ]);
        let parts = parse(CT, &body, DEFAULT_MAX_MEMORY).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], Part::Field { name, value } if name == "name" && value == "john"));
        match &parts[1] {
            Part::File { name, file } => {
                assert_eq!(name, "avatar");
                assert_eq!(file.filename, "a.txt");
                assert_eq!(file.content_type, "text/plain");
                assert_eq!(&file.content[..], b"hello\r\nworld");
                assert_eq!(file.size(), 12);
            }
            other => panic!("expected a file, got {other:?}"),
        }
    }

    #[test]
    fn files_default_to_octet_stream() {
        let body = body(&["Content-Disposition: form-data; name=\"f\"; filename=\"x.bin\"\r\n\r\n\x01"]);
        let parts = parse(CT, &body, DEFAULT_MAX_MEMORY).unwrap();
        assert!(matches!(&parts[0], Part::File { file, .. } if file.content_type == "application/octet-stream"));
    }

    #[test]
    fn empty_file_input_is_a_plain_field() {
        let body = body(&[
            "Content-Disposition: form-data; name=\"resume\"; filename=\"\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            "Content-Disposition: form-data; name=\"note\"; filename=\"a;b.txt\"\r\n\r\nx",
        ]);
        let parts = parse(CT, &body, DEFAULT_MAX_MEMORY).unwrap();
        assert!(matches!(&parts[0], Part::Field { name, value } if name == "resume" && value.is_empty()));
        assert!(matches!(&parts[1], Part::File { file, .. } if file.filename == "a;b.txt"));
    }

    #[test]
    fn oversized_body_fails() {
        let body = body(&["Content-Disposition: form-data; name=\"a\"\r\n\r\n0123456789"]);
        assert!(matches!(parse(CT, &body, 16), Err(Error::Parse(_))));
    }

    #[test]
    fn missing_boundary_fails() {
        let body = body(&["Content-Disposition: form-data; name=\"a\"\r\n\r\nv"]);
        assert!(matches!(parse("multipart/form-data", &body, DEFAULT_MAX_MEMORY), Err(Error::Parse(_))));
    }

    #[test]
    fn truncated_body_fails() {
        let body = Bytes::from_static(b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nv");
        assert!(matches!(parse(CT, &body, DEFAULT_MAX_MEMORY), Err(Error::Parse(_))));
    }
}
