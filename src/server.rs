use crate::config::Config;
use crate::connection::Connection;
use crate::counters::Counters;
use crate::handler;
use crate::privileges;
use mio::event::Events;
use mio::net::TcpListener;
use mio::{Interest, Poll, Token, Waker};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

// Tokens used for the MIO event loop
const SERVER: Token = Token(0);
const SHUTDOWN: Token = Token(1);

/// The reason the server exited
#[derive(Debug, Default)]
pub enum ServerExitReason {
    /// It was gracefully shutdown
    #[default]
    Normal,
    /// Polling the server socket for new connections failed somehow.
    Err(io::Error),
    /// The server panicked. The payload will contain the panic message.
    Panic(String),
}

/// Handle to a running Gopher server
pub struct ServerHandle {
    address: SocketAddr,
    server_loop: JoinHandle<ServerExitReason>,
    server_waker: Waker,
    observe_shutdown: Receiver<()>,
}

impl ServerHandle {
    /// Blocks until the server terminates and returns the reason.
    ///
    /// This function does not attempt to stop the server.
    /// It waits (potentially indefinitely) until the server exits.
    /// If you want to stop the server, use [`stop()`](ServerHandle::stop).
    pub fn join(self) -> ServerExitReason {
        match self.server_loop.join() {
            Ok(reason) => reason,
            Err(any) => match any.as_ref().downcast_ref::<String>() {
                Some(s) => ServerExitReason::Panic(s.clone()),
                None => match any.as_ref().downcast_ref::<&str>() {
                    Some(s) => ServerExitReason::Panic(s.to_string()),
                    None => ServerExitReason::Panic(String::new()),
                },
            },
        }
    }

    /// Stops the server.
    ///
    /// In-flight connections are served to completion before the accept
    /// thread exits.
    pub fn stop(self) {
        // Wake up the server thread. It can tell it was woken by the waker
        // instead of by a new readable Tcp connection. If this call fails,
        // just return; we don't want to block on the `recv()` below if it's
        // possible we didn't wake the server. Graceful shutdown is "best
        // effort".
        let Ok(()) = self.server_waker.wake() else {
            return;
        };

        // Normally, after the server thread is woken, it will eventually
        // rendezvous here. If it exited due to an error or panicked instead,
        // this recv fails; either way the server loop is stopped.
        let _ = self.observe_shutdown.recv();
    }

    /// Returns the address at which the server is currently listening
    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

/// Binds the listen socket, drops privileges when configured, and starts
/// the accept loop on its own thread.
pub fn start(mut config: Config) -> Result<ServerHandle, io::Error> {
    let address = resolve_listen(&config.listen)?;
    let mut socket = TcpListener::bind(address)?;
    let address = socket.local_addr()?;

    config.adopt_listen_port(address.port());
    config.root = config.root.canonicalize_utf8()?;

    if !config.user.is_empty() {
        privileges::drop_to_user(&config.user)?;
    }

    log::info!("Gopher server listening on {address}");

    let poll = Poll::new()?;
    let events = Events::with_capacity(128);
    let server_waker = Waker::new(poll.registry(), SHUTDOWN)?;
    poll.registry()
        .register(&mut socket, SERVER, Interest::READABLE)?;
    let (signal_shutdown, observe_shutdown) = sync_channel(0);

    let accept = AcceptLoop {
        socket,
        config: Arc::new(config),
        counters: Arc::new(Counters::new()),
        poll,
        events,
        signal_shutdown,
    };
    let server_loop = thread::spawn(move || run(accept));

    Ok(ServerHandle {
        address,
        server_loop,
        server_waker,
        observe_shutdown,
    })
}

/// Parses `listen` as `[host:]port`. An empty or missing host means the
/// wildcard address; a bracketed IPv6 host is accepted.
fn resolve_listen(listen: &str) -> io::Result<SocketAddr> {
    let (host, port) = match listen.rsplit_once(':') {
        Some(("", port)) => ("0.0.0.0", port),
        Some((host, port)) => (host, port),
        None => ("0.0.0.0", listen),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port: u16 = port
        .parse()
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

    let mut addresses = (host, port).to_socket_addrs()?;
    addresses
        .next()
        .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))
}

struct AcceptLoop {
    socket: TcpListener,
    config: Arc<Config>,
    counters: Arc<Counters>,
    poll: Poll,
    events: Events,
    signal_shutdown: SyncSender<()>,
}

fn run(mut accept: AcceptLoop) -> ServerExitReason {
    let pool = threadpool::Builder::new()
        .num_threads(accept.config.max_connections)
        .build();
    let slots = Arc::new(Slots::new(accept.config.max_connections));

    loop {
        if let Err(err) = accept.poll.poll(&mut accept.events, None) {
            log::warn!(error:err = err; "Poll call failed. Server loop will exit");
            pool.join();
            return ServerExitReason::Err(err);
        }

        for event in accept.events.iter() {
            match event.token() {
                SERVER => loop {
                    // Take a slot first, so that accept itself blocks once
                    // max_connections handlers are running.
                    slots.acquire();
                    match accept.socket.accept() {
                        Ok((stream, peer)) => {
                            let conn = match Connection::try_from(stream) {
                                Ok(conn) => conn,
                                Err(err) => {
                                    slots.release();
                                    log::warn!(error:err = err; "Could not prepare accepted connection");
                                    continue;
                                }
                            };
                            let guard = SlotGuard(slots.clone());
                            let config = accept.config.clone();
                            let counters = accept.counters.clone();
                            pool.execute(move || {
                                // The socket closes when `conn` drops, before
                                // the guard hands the slot back.
                                let _slot = guard;
                                let mut conn = conn;
                                handler::handle_connection(&mut conn, peer, &config, &counters);
                            });
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            slots.release();
                            break;
                        }
                        Err(err) => {
                            slots.release();
                            log::warn!(error:err = err; "Socket accept call failed");
                            break;
                        }
                    }
                },
                SHUTDOWN => {
                    pool.join();
                    if accept.signal_shutdown.send(()).is_err() {
                        // The only way this happens is if the main thread
                        // called `wake()` then immediately dropped the
                        // receiver, which stop() does not do. If it somehow
                        // happens anyway, it should be known.
                        log::error!(
                            "unreachable code reached! failed to notify main thread of shutdown."
                        );
                        unreachable!("failed to notify main thread of shutdown");
                    }
                    return ServerExitReason::Normal;
                }
                _ => unreachable!(),
            }
        }
    }
}

// Counting semaphore bounding concurrent connection handlers. Acquired on
// the accept thread before `accept`; released by whichever pool thread
// finished the connection.
struct Slots {
    available: Mutex<usize>,
    freed: Condvar,
}

impl Slots {
    fn new(count: usize) -> Self {
        Self {
            available: Mutex::new(count),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *available == 0 {
            available = self
                .freed
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
    }

    fn release(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available += 1;
        self.freed.notify_one();
    }
}

// Hands the slot back when the handler is done with it, panics included.
struct SlotGuard(Arc<Slots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listen_addresses_parse_with_and_without_hosts() {
        assert_eq!(resolve_listen(":70").unwrap().port(), 70);
        assert_eq!(resolve_listen("70").unwrap().port(), 70);
        assert_eq!(
            resolve_listen("127.0.0.1:7070").unwrap(),
            "127.0.0.1:7070".parse().unwrap()
        );
        assert!(resolve_listen("127.0.0.1:").is_err());
        assert!(resolve_listen("nope:seventy").is_err());
    }

    #[test]
    fn slots_never_admit_more_than_their_capacity() {
        let slots = Arc::new(Slots::new(4));
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..32)
            .map(|_| {
                let slots = slots.clone();
                let peak = peak.clone();
                let active = active.clone();
                thread::spawn(move || {
                    slots.acquire();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    active.fetch_sub(1, Ordering::SeqCst);
                    slots.release();
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }
}
