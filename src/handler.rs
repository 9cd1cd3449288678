use crate::cgi;
use crate::config::Config;
use crate::connection::Connection;
use crate::counters::Counters;
use crate::error::GopherError;
use crate::path;
use crate::request;
use crate::resolve;
use crate::response::{Body, Response};
use jiff::Timestamp;
use std::io::{Read, Write};
use std::net::SocketAddr;

/// Responses are streamed to the client in chunks of this many bytes.
const WRITE_CHUNK: usize = 1000;

/// What the request log needs to know about one finished connection.
#[derive(Debug)]
pub struct RequestInfo {
    pub remote_host: String,
    pub received_at: Timestamp,
    pub request: Vec<u8>,
    pub status: u16,
    pub transferred: u64,
}

/// Serves one connection end to end: read, resolve, stream, account, log.
///
/// Failures up to dispatch become a Gopher error menu with the matching
/// status. Once streaming has begun the status is settled; a write failure
/// or a source that dries up mid-stream just ends the response. The CGI
/// child, when there is one, is reaped when the body drops, before the log
/// line is written.
pub fn handle_connection(
    conn: &mut Connection,
    peer: SocketAddr,
    config: &Config,
    counters: &Counters,
) {
    let received_at = Timestamp::now();

    let mut raw = Vec::new();
    let response = match serve(conn, &mut raw, peer, config, counters) {
        Ok(response) => response,
        Err(err) => Response::error(err, &config.server_host, config.server_port),
    };

    let status = response.status;
    let transferred = stream(response.body, conn, config);

    counters.record(transferred);
    log_request(RequestInfo {
        remote_host: peer.ip().to_string(),
        received_at,
        request: raw,
        status,
        transferred,
    });
}

fn serve(
    conn: &mut Connection,
    raw: &mut Vec<u8>,
    peer: SocketAddr,
    config: &Config,
    counters: &Counters,
) -> Result<Response, GopherError> {
    *raw = request::read_request(conn, config.read_timeout())?;
    let split = request::split_request(raw)?;
    let normalized = path::normalize(&split.path)?;
    let resolved = resolve::resolve(&config.root, &normalized, &config.excluded)?;

    if resolved.is_script() {
        cgi::run(&resolved, &split, peer, config, counters)
    } else {
        Response::file(&resolved.fs_path)
    }
}

/// Copies `body` to the client in [`WRITE_CHUNK`]-sized writes, arming the
/// write-progress deadline before each one. Returns the bytes transferred.
fn stream(mut body: Body, conn: &mut Connection, config: &Config) -> u64 {
    let mut chunk = [0u8; WRITE_CHUNK];
    let mut transferred: u64 = 0;
    loop {
        let n = match body.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if conn.set_write_timeout(config.write_timeout()).is_err() {
            break;
        }
        if conn.write_all(&chunk[..n]).is_err() {
            break;
        }
        transferred += n as u64;
    }
    let _ = conn.flush();
    transferred
}

/// One request-log line on stderr:
/// `<host> - - [<RFC3339>] "<request>" <status> <bytes-or-dash>`.
fn log_request(info: RequestInfo) {
    let request = String::from_utf8_lossy(&info.request);
    let transferred = if info.transferred == 0 {
        "-".to_string()
    } else {
        info.transferred.to_string()
    };
    eprintln!(
        "{} - - [{}] {:?} {} {}",
        info.remote_host, info.received_at, request, info.status, transferred
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::collections::VecDeque;

    fn peer() -> SocketAddr {
        "127.0.0.1:4242".parse().unwrap()
    }

    fn config_with_root(root: &str) -> Config {
        Config {
            root: Utf8PathBuf::from(root),
            server_host: "localhost".to_string(),
            server_port: 70,
            ..Config::default()
        }
    }

    fn run_handler(request: &[u8], config: &Config, counters: &Counters) -> Vec<u8> {
        let mut conn = Connection::Test(VecDeque::from(request.to_vec()));
        handle_connection(&mut conn, peer(), config, counters);
        match conn {
            Connection::Test(rest) => rest.into_iter().collect(),
            Connection::Tcp(_) => unreachable!(),
        }
    }

    #[test]
    fn a_static_selector_streams_the_file() {
        let config = config_with_root("tests");
        let counters = Counters::new();
        let response = run_handler(b"/text.txt\r\n", &config, &counters);
        assert_eq!(response, std::fs::read("tests/text.txt").unwrap());
        assert_eq!(counters.requests(), 1);
        assert_eq!(counters.bytes(), response.len() as u64);
    }

    #[test]
    fn an_unresolvable_selector_becomes_an_error_menu() {
        // tests/foo has no index of its own, so nothing can resolve there.
        let config = config_with_root("tests/foo");
        let counters = Counters::new();
        let response = run_handler(b"/missing\r\n", &config, &counters);
        assert_eq!(
            response,
            b"3File not found.\t\tlocalhost\t70\r\n.\r\n".to_vec()
        );
    }

    #[test]
    fn a_nul_byte_becomes_a_bad_request_menu() {
        let config = config_with_root("tests");
        let counters = Counters::new();
        let response = run_handler(b"/\x00\r\n", &config, &counters);
        assert!(response.starts_with(b"3Bad request."));
    }

    #[test]
    fn a_traversal_attempt_becomes_a_forbidden_menu() {
        let config = config_with_root("tests");
        let counters = Counters::new();
        let response = run_handler(b"/../secret\r\n", &config, &counters);
        assert!(response.starts_with(b"3Forbidden."));
    }
}
