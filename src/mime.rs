//! MIME types recognised for body dispatch and content-type helpers.

pub const TEXT_XML: &str = "text/xml";
pub const APPLICATION_XML: &str = "application/xml";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM: &str = "multipart/form-data";

/// Truncates a content type at the first space or `;`, dropping parameters.
pub fn filter_flags(content: &str) -> &str {
    match content.find([' ', ';']) {
        Some(i) => &content[..i],
        None => content,
    }
}

/// Rewrites a vendor-specific content type to its base type.
///
/// `application/vnd.api+json` becomes `application/json`. Parameters after a
/// `;` are dropped from the rewritten type. Types without a `+` come back
/// unchanged.
pub fn parse_vendor_specific(content: &str) -> String {
    let Some(plus) = content.find('+') else {
        return content.to_owned();
    };

    let suffix = match content.find(';') {
        None => &content[plus + 1..],
        Some(semi) if plus < semi => &content[plus + 1..semi],
        Some(semi) => return content[..semi].to_owned(),
    };

    match content.find('/') {
        Some(slash) => format!("{}{suffix}", &content[..=slash]),
        None => content.to_owned(),
    }
}

/// Lowercased, vendor-normalised, parameter-free MIME type of a header value.
pub fn essence(content_type: &str) -> String {
    let lower = content_type.to_ascii_lowercase();
    filter_flags(&parse_vendor_specific(&lower)).to_owned()
}

/// Extracts a parameter (e.g. `boundary`) from a content-type header value.
pub(crate) fn param<'a>(content_type: &'a str, name: &str) -> Option<&'a str> {
    split_params(content_type).into_iter().skip(1).find_map(|part| {
        let (k, v) = part.split_once('=')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim().trim_matches('"'))
    })
}

/// Splits a header value on `;`, leaving quoted strings intact.
fn split_params(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut start, mut quoted, mut escaped) = (0, false, false);
    for (i, b) in value.bytes().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' if quoted => escaped = true,
            b'"' => quoted = !quoted,
            b';' if !quoted => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_types_collapse_to_base() {
        assert_eq!(parse_vendor_specific("application/vnd.foo+json"), "application/json");
        assert_eq!(parse_vendor_specific("application/problem+xml; charset=utf-8"), "application/xml");
        assert_eq!(parse_vendor_specific("application/json"), "application/json");
        assert_eq!(parse_vendor_specific("text/plain; x=a+b"), "text/plain");
    }

    #[test]
    fn flags_are_filtered() {
        assert_eq!(filter_flags("application/json; charset=utf-8"), "application/json");
        assert_eq!(filter_flags("text/xml"), "text/xml");
    }

    #[test]
    fn essence_lowercases_and_strips() {
        assert_eq!(essence("Application/VND.Api+JSON; charset=UTF-8"), "application/json");
        assert_eq!(essence("multipart/form-data; boundary=xyz"), MULTIPART_FORM);
    }

    #[test]
    fn boundary_param() {
        let ct = r#"multipart/form-data; boundary="abc123""#;
        assert_eq!(param(ct, "boundary"), Some("abc123"));
        assert_eq!(param("multipart/form-data", "boundary"), None);
    }

    #[test]
    fn quoted_params_keep_semicolons() {
        let disposition = r#"form-data; name="a;b"; filename="x; y.txt""#;
        assert_eq!(param(disposition, "name"), Some("a;b"));
        assert_eq!(param(disposition, "filename"), Some("x; y.txt"));
    }
}
