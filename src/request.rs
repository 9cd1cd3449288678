use crate::connection::Connection;
use crate::error::GopherError;
use std::io::Read;
use std::time::Duration;

/// Upper bound on the bytes accepted for one request line.
pub const MAX_REQUEST_LENGTH: usize = 16 * 1024;

/// Reads one request line, terminated by LF or CRLF, from the client.
///
/// The returned bytes are the line with its terminator stripped. A NUL
/// anywhere, a CR anywhere but immediately before the LF, more than
/// [`MAX_REQUEST_LENGTH`] bytes without an LF, and a read that fails or hits
/// EOF first are all `BadRequest`. The read deadline, when configured, is
/// armed once before the first read.
pub fn read_request(
    conn: &mut Connection,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, GopherError> {
    if conn.set_read_timeout(timeout).is_err() {
        return Err(GopherError::InternalServerError);
    }

    let mut request: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = match conn.read(&mut chunk) {
            Ok(0) => return Err(GopherError::BadRequest),
            Ok(n) => n,
            Err(_) => return Err(GopherError::BadRequest),
        };
        let chunk = &chunk[..n];

        if chunk.contains(&0) {
            return Err(GopherError::BadRequest);
        }

        match chunk.iter().position(|&byte| byte == b'\n') {
            Some(eol) => {
                request.extend_from_slice(&chunk[..eol]);
                if request.len() > MAX_REQUEST_LENGTH {
                    return Err(GopherError::BadRequest);
                }
                if request.last() == Some(&b'\r') {
                    request.pop();
                }
                if request.contains(&b'\r') {
                    return Err(GopherError::BadRequest);
                }
                return Ok(request);
            }
            None => {
                request.extend_from_slice(chunk);
                if request.len() > MAX_REQUEST_LENGTH {
                    return Err(GopherError::BadRequest);
                }
            }
        }
    }
}

/// A request line split into its Gopher components.
///
/// `selector` is `path`, plus `?` and `query` when a query is present.
/// `search` is the text after the first tab of the raw request, truncated at
/// any further tab.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitRequest {
    pub selector: String,
    pub path: String,
    pub query: String,
    pub search: String,
}

/// Splits the raw request at its first tab into selector and search string,
/// then the selector at its first `?` into path and query. A second tab and
/// everything after it is dropped; Gopher+ clients append one.
pub fn split_request(raw: &[u8]) -> Result<SplitRequest, GopherError> {
    let text = std::str::from_utf8(raw).map_err(|_| GopherError::BadRequest)?;
    let (selector, rest) = cut(text, '\t');
    let (search, _) = cut(rest, '\t');
    let (path, query) = cut(selector, '?');
    Ok(SplitRequest {
        selector: selector.to_string(),
        path: path.to_string(),
        query: query.to_string(),
        search: search.to_string(),
    })
}

fn cut(text: &str, separator: char) -> (&str, &str) {
    match text.split_once(separator) {
        Some((head, tail)) => (head, tail),
        None => (text, ""),
    }
}

#[cfg(test)]
mod split_tests {
    use super::*;

    #[test]
    fn selector_query_and_search_come_apart() {
        let split = split_request(b"/script?query\tsearch").unwrap();
        assert_eq!(split.selector, "/script?query");
        assert_eq!(split.path, "/script");
        assert_eq!(split.query, "query");
        assert_eq!(split.search, "search");
    }

    #[test]
    fn the_empty_request_splits_into_empty_parts() {
        let split = split_request(b"").unwrap();
        assert_eq!(split, SplitRequest::default());
    }

    #[test]
    fn a_second_tab_truncates_the_search_string() {
        let split = split_request(b"/selector\tsearch\t$").unwrap();
        assert_eq!(split.selector, "/selector");
        assert_eq!(split.search, "search");
    }

    #[test]
    fn only_the_first_question_mark_starts_the_query() {
        let split = split_request(b"/a?b?c").unwrap();
        assert_eq!(split.path, "/a");
        assert_eq!(split.query, "b?c");
        assert_eq!(split.selector, "/a?b?c");
    }

    #[test]
    fn splitting_round_trips_the_selector() {
        for raw in [&b"/path"[..], &b"/path?q"[..], &b"/path?q\ts"[..], &b"\tsearch"[..]] {
            let split = split_request(raw).unwrap();
            let mut rebuilt = split.path.clone();
            if !split.query.is_empty() {
                rebuilt.push('?');
                rebuilt.push_str(&split.query);
            }
            assert_eq!(rebuilt, split.selector);
        }
    }

    #[test]
    fn invalid_utf8_is_a_bad_request() {
        assert!(split_request(b"/\xff\xfe").is_err());
    }
}

#[cfg(test)]
mod read_tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;

    fn connection(bytes: &[u8]) -> Connection {
        Connection::Test(VecDeque::from(bytes.to_vec()))
    }

    #[test]
    fn reads_up_to_the_line_feed() {
        let mut conn = connection(b"/selector\nignored");
        assert_eq!(read_request(&mut conn, None).unwrap(), b"/selector");
    }

    #[test]
    fn strips_a_carriage_return_before_the_line_feed() {
        let mut conn = connection(b"/selector\r\n");
        assert_eq!(read_request(&mut conn, None).unwrap(), b"/selector");
    }

    #[test]
    fn a_bare_line_feed_is_an_empty_request() {
        let mut conn = connection(b"\n");
        assert_eq!(read_request(&mut conn, None).unwrap(), b"");
    }

    #[test]
    fn a_stray_carriage_return_is_a_bad_request() {
        let mut conn = connection(b"/sel\rector\n");
        assert_matches!(read_request(&mut conn, None), Err(GopherError::BadRequest));
    }

    #[test]
    fn a_nul_byte_is_a_bad_request() {
        let mut conn = connection(b"/sel\x00ector\n");
        assert_matches!(read_request(&mut conn, None), Err(GopherError::BadRequest));
    }

    #[test]
    fn eof_before_the_line_feed_is_a_bad_request() {
        let mut conn = connection(b"/selector");
        assert_matches!(read_request(&mut conn, None), Err(GopherError::BadRequest));
    }

    #[test]
    fn an_overlong_request_is_a_bad_request() {
        let mut conn = connection(&[b'a'; MAX_REQUEST_LENGTH + 1]);
        assert_matches!(read_request(&mut conn, None), Err(GopherError::BadRequest));
    }

    #[test]
    fn a_request_at_the_limit_is_accepted() {
        let mut raw = vec![b'a'; MAX_REQUEST_LENGTH];
        raw.push(b'\n');
        let mut conn = connection(&raw);
        assert_eq!(read_request(&mut conn, None).unwrap().len(), MAX_REQUEST_LENGTH);
    }
}
