use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

#[cfg(test)]
use std::collections::VecDeque;

/// A client connection.
///
/// The `Test` variant backs the connection with an in-memory buffer so that
/// request parsing and response streaming can be exercised without a socket:
/// preload it with a request line, run the handler, and whatever remains in
/// the buffer is the response.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(test)]
    Test(VecDeque<u8>),
}

impl Connection {
    /// Applies `timeout` to every subsequent read. `None` leaves reads
    /// unbounded.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(test)]
            Connection::Test(_) => Ok(()),
        }
    }

    /// Applies `timeout` to every subsequent write. `None` leaves writes
    /// unbounded.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.set_write_timeout(timeout),
            #[cfg(test)]
            Connection::Test(_) => Ok(()),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(r) => r.read(buf),
            #[cfg(test)]
            Connection::Test(r) => r.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(w) => w.write(buf),
            #[cfg(test)]
            Connection::Test(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(w) => w.flush(),
            #[cfg(test)]
            Connection::Test(w) => w.flush(),
        }
    }
}

impl TryFrom<mio::net::TcpStream> for Connection {
    type Error = io::Error;

    fn try_from(value: mio::net::TcpStream) -> Result<Self, Self::Error> {
        // Convert to a regular blocking TcpStream here, since it would be
        // annoying to manage a mio event loop for every call to
        // read/write/flush. The handler arms the per-side deadlines itself.
        let stream = TcpStream::from(value);
        stream.set_nonblocking(false)?;
        Ok(Connection::Tcp(stream))
    }
}
