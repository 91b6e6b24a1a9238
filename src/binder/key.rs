//! Bracketed key normalisation: `posts[0][title]` → `posts.0.title`.

use crate::error::{Error, Result};

/// Rewrites square-bracket segments into dotted path segments.
///
/// An empty index (`tags[]`) adds no segment. Unbalanced brackets fail.
pub fn normalize_key(key: &str) -> Result<String> {
    let bytes = key.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut depth: usize = 0;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'[' => {
                depth += 1;
                if bytes.get(i + 1).is_some_and(|&next| next != b']') {
                    out.push(b'.');
                }
            }
            b']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::MalformedKey { key: key.to_owned() })?;
            }
            _ => out.push(b),
        }
    }

    if depth != 0 {
        return Err(Error::MalformedKey { key: key.to_owned() });
    }

    // Only ASCII bytes were inserted or removed, so the output stays UTF-8.
    String::from_utf8(out).map_err(|_| Error::MalformedKey { key: key.to_owned() })
}

/// Normalises `key` only when it carries brackets.
pub(crate) fn normalize_if_bracketed(key: &str) -> Result<String> {
    if key.contains(['[', ']']) {
        normalize_key(key)
    } else {
        Ok(key.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_are_identity() {
        for key in ["name", "X-Test-Header", "a.b", "", "ünïcode"] {
            assert_eq!(normalize_key(key).unwrap(), key);
        }
    }

    #[test]
    fn nested_indexes_become_dots() {
        assert_eq!(normalize_key("posts[0][title]").unwrap(), "posts.0.title");
        assert_eq!(normalize_key("a[b][c][d]").unwrap(), "a.b.c.d");
    }

    #[test]
    fn empty_index_adds_no_segment() {
        assert_eq!(normalize_key("tags[]").unwrap(), "tags");
        assert_eq!(normalize_key("a[][b]").unwrap(), "a.b");
    }

    #[test]
    fn dot_count_matches_non_empty_openings() {
        let key = "x[1][]{y}[z][][q]";
        let dots = normalize_key(key).unwrap().matches('.').count();
        assert_eq!(dots, 3);
    }

    #[test]
    fn unbalanced_brackets_fail() {
        for key in ["a[", "a]", "a[b]]", "a[[b]", "]["] {
            assert!(
                matches!(normalize_key(key), Err(Error::MalformedKey { .. })),
                "{key} should fail"
            );
        }
    }

    #[test]
    fn trailing_open_bracket_fails() {
        // `[` at the end emits no separator but leaves depth at one.
        assert!(normalize_key("name[").is_err());
    }
}
