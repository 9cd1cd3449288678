use crate::config::Config;
use crate::counters::Counters;
use crate::error::GopherError;
use crate::request::SplitRequest;
use crate::resolve::ResolvedPath;
use crate::response::{Body, Response};
use crate::status;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::process::{Child, ChildStdout, Command, Stdio};

/// Search path exported to children in place of the server's own.
const CHILD_PATH: &str = "/usr/bin:/bin";

/// `SERVER_SOFTWARE` value reported to children.
const SOFTWARE: &str = concat!("thirteen/", env!("CARGO_PKG_VERSION"));

/// A running CGI child and the read side of its stdout pipe.
///
/// Dropping the reader closes the pipe and then reaps the child, so a
/// handler cannot leak a zombie no matter how streaming ended. The pipe must
/// close first: a child still writing would otherwise never exit.
#[derive(Debug)]
pub struct CgiReader {
    stdout: Option<ChildStdout>,
    child: Child,
}

impl Read for CgiReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stdout {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for CgiReader {
    fn drop(&mut self) {
        drop(self.stdout.take());
        match self.child.wait() {
            Ok(state) if !state.success() => {
                log::debug!("CGI child exited with {state}");
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!(error:err = err; "failed to reap CGI child");
            }
        }
    }
}

/// Runs the resolved script and returns its stdout as the response body.
///
/// The child receives six positional arguments (search string, query,
/// server host, server port, path-info, raw selector), an environment built
/// from scratch, and the script's directory as its working directory. Its
/// stderr stays attached to the server's stderr and never reaches the
/// client.
pub fn run(
    script: &ResolvedPath,
    request: &SplitRequest,
    peer: SocketAddr,
    config: &Config,
    counters: &Counters,
) -> Result<Response, GopherError> {
    let work_dir = match script.fs_path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => config.root.clone(),
    };

    let spawned = Command::new(script.fs_path.as_std_path())
        .arg(&request.search)
        .arg(&request.query)
        .arg(&config.server_host)
        .arg(config.server_port.to_string())
        .arg(&script.path_info)
        .arg(&request.selector)
        .current_dir(work_dir)
        .env_clear()
        .envs(environment(script, request, peer, config, counters))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            log::warn!(error:err = err, script = script.fs_path.as_str(); "failed to spawn CGI child");
            return Err(GopherError::InternalServerError);
        }
    };

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GopherError::InternalServerError);
        }
    };

    Ok(Response {
        status: status::OK,
        body: Body::Script(CgiReader {
            stdout: Some(stdout),
            child,
        }),
    })
}

/// The complete child environment. Nothing is inherited; aliases carry the
/// same value under the names other Gopher servers use, so their scripts run
/// unchanged.
fn environment(
    script: &ResolvedPath,
    request: &SplitRequest,
    peer: SocketAddr,
    config: &Config,
    counters: &Counters,
) -> Vec<(&'static str, String)> {
    let root = config.root.as_str();
    let path_translated = if script.path_info.is_empty() {
        String::new()
    } else {
        format!("{root}{}", script.path_info)
    };
    let remote_host = peer.ip().to_string();
    let server_port = config.server_port.to_string();

    vec![
        ("PATH", CHILD_PATH.to_string()),
        ("GATEWAY_INTERFACE", "CGI/1.1".to_string()),
        ("SERVER_PROTOCOL", "GOPHER".to_string()),
        ("SERVER_SOFTWARE", SOFTWARE.to_string()),
        ("REQUEST_METHOD", "GET".to_string()),
        ("PATH_INFO", script.path_info.clone()),
        ("PATH_TRANSLATED", path_translated),
        ("SERVER_NAME", config.server_host.clone()),
        ("SERVER_HOST", config.server_host.clone()),
        ("SERVER_PORT", server_port),
        ("QUERY_STRING", request.query.clone()),
        ("QUERY_STRING_URL", request.query.clone()),
        ("REMOTE_ADDR", remote_host.clone()),
        ("REMOTE_HOST", remote_host),
        ("REMOTE_PORT", peer.port().to_string()),
        ("SCRIPT_NAME", script.script_name.clone()),
        ("SCRIPT_FILENAME", script.fs_path.to_string()),
        ("GOPHER_SCRIPT_FILENAME", script.fs_path.to_string()),
        ("DOCUMENT_ROOT", root.to_string()),
        ("GOPHER_DOCUMENT_ROOT", root.to_string()),
        ("SERVER_DESCRIPTION", config.description.clone()),
        ("SEARCHREQUEST", request.search.clone()),
        ("X_GOPHER_SEARCH", request.search.clone()),
        ("QUERY_STRING_SEARCH", request.search.clone()),
        ("SELECTOR", request.selector.clone()),
        ("GOPHER_DOCUMENT_SELECTOR", request.selector.clone()),
        (
            "REQUEST",
            format!("{}{}", script.script_name, script.path_info),
        ),
        ("THIRTEEN_UPTIME", counters.uptime_seconds().to_string()),
        ("THIRTEEN_REQUESTS", counters.requests().to_string()),
        ("THIRTEEN_BYTES", counters.bytes().to_string()),
    ]
}
