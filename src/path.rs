use crate::error::GopherError;
use percent_encoding::percent_decode_str;

/// Percent-decodes `raw` and lexically folds its segments.
///
/// Runs of `/` collapse, `.` segments drop, and `..` pops the previous
/// segment; popping past the root is `Forbidden`. The result joins the
/// remaining segments, each prefixed with `/`, keeping a trailing `/` when
/// the input ended in one. An input without a leading `/` is treated as if
/// it had one. The result is empty only when every segment folded away and
/// the input did not end in `/`.
pub fn normalize(raw: &str) -> Result<String, GopherError> {
    let decoded = decode(raw)?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(GopherError::Forbidden);
                }
            }
            segment => segments.push(segment),
        }
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if decoded.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Strict percent-decoding.
///
/// `percent_decode_str` passes malformed escapes through untouched, so every
/// `%` is first required to introduce two hex digits. A decoded NUL or
/// invalid UTF-8 is `BadRequest`.
fn decode(raw: &str) -> Result<String, GopherError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if bytes.len() < i + 3
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return Err(GopherError::BadRequest);
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| GopherError::BadRequest)?;
    if decoded.contains('\0') {
        return Err(GopherError::BadRequest);
    }
    Ok(decoded.into_owned())
}
