use crate::cgi::CgiReader;
use crate::error::GopherError;
use crate::status;
use camino::Utf8Path;
use std::fs::File;
use std::io::{self, Cursor, Read};

/// A response ready to stream: a byte source plus the status recorded in
/// the request log.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub body: Body,
}

/// The byte source backing a response.
#[derive(Debug)]
pub enum Body {
    /// A regular file, streamed verbatim.
    File(File),
    /// A CGI child's standard output.
    Script(CgiReader),
    /// An in-memory Gopher menu; errors are rendered this way.
    Menu(Cursor<Vec<u8>>),
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::File(reader) => reader.read(buf),
            Body::Script(reader) => reader.read(buf),
            Body::Menu(reader) => reader.read(buf),
        }
    }
}

impl Response {
    /// Opens `path` as a static response.
    pub fn file(path: &Utf8Path) -> Result<Response, GopherError> {
        match File::open(path) {
            Ok(file) => Ok(Response {
                status: status::OK,
                body: Body::File(file),
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(GopherError::FileNotFound),
            Err(_) => Err(GopherError::Forbidden),
        }
    }

    /// Renders `error` as a single-entry Gopher error menu, the only form
    /// failures ever take on the wire.
    pub fn error(error: GopherError, host: &str, port: u16) -> Response {
        let menu = format!("3{error}\t\t{host}\t{port}\r\n.\r\n");
        Response {
            status: error.status(),
            body: Body::Menu(Cursor::new(menu.into_bytes())),
        }
    }
}
