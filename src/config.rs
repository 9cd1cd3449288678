use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use std::collections::BTreeSet;
use std::time::Duration;

/// Command-line flags, one per configurable option.
#[derive(Debug, Parser)]
#[command(name = "thirteen", version, about = "A Gopher protocol server with CGI support")]
pub struct Flags {
    /// Server description passed to CGI scripts.
    #[arg(long, default_value = "")]
    pub desc: String,

    /// Listen address, as [host:]port. An empty host means every interface.
    #[arg(long, default_value = ":70")]
    pub listen: String,

    /// Maximum number of concurrently served connections.
    #[arg(long, default_value_t = 100)]
    pub maxconn: usize,

    /// Document root directory.
    #[arg(long, default_value = "/var/gopher")]
    pub root: Utf8PathBuf,

    /// Request read timeout in seconds. 0 disables it (not recommended).
    #[arg(long, default_value_t = 10)]
    pub rtmo: u64,

    /// Host name reported to clients and CGI scripts.
    #[arg(long, default_value = "localhost")]
    pub serverhost: String,

    /// Port reported to clients and CGI scripts. 0 adopts the listen port.
    #[arg(long, default_value_t = 0)]
    pub serverport: u16,

    /// Switch to this user once the listen socket is bound.
    #[arg(long, default_value = "")]
    pub user: String,

    /// Response write-progress timeout in seconds. 0 disables it.
    #[arg(long, default_value_t = 10)]
    pub wtmo: u64,

    /// File extension that must never be served. May be repeated.
    #[arg(long, value_name = "EXT")]
    pub exclude: Vec<String>,
}

impl Flags {
    /// Validates the flags and builds the runtime configuration.
    pub fn into_config(self) -> Result<Config, String> {
        if self.maxconn < 1 {
            return Err("maxconn must be at least 1".to_string());
        }
        listen_port(&self.listen)?;

        let mut excluded = ExcludedExtensions::default();
        for extension in &self.exclude {
            excluded.add(extension)?;
        }

        Ok(Config {
            description: self.desc,
            listen: self.listen,
            max_connections: self.maxconn,
            root: self.root,
            request_timeout: self.rtmo,
            server_host: self.serverhost,
            server_port: self.serverport,
            user: self.user,
            response_timeout: self.wtmo,
            excluded,
        })
    }
}

fn listen_port(listen: &str) -> Result<u16, String> {
    let port = match listen.rsplit_once(':') {
        Some((_, port)) => port,
        None => listen,
    };
    match port.parse::<u16>() {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(format!("invalid listen port {port:?}")),
    }
}

/// Runtime configuration, fixed after startup.
///
/// The one sanctioned post-startup mutation is adopting the bound listen
/// port as `server_port` when the flag was left at 0; `start` does this
/// before the accept loop spawns, after which the value is cloned into
/// workers and never changes.
#[derive(Debug, Clone)]
pub struct Config {
    pub description: String,
    pub listen: String,
    pub max_connections: usize,
    pub root: Utf8PathBuf,
    /// Seconds allowed for reading the request line. 0 disables the deadline.
    pub request_timeout: u64,
    pub server_host: String,
    pub server_port: u16,
    pub user: String,
    /// Seconds any single response write may stall. 0 disables the deadline.
    pub response_timeout: u64,
    pub excluded: ExcludedExtensions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            description: String::new(),
            listen: ":70".to_string(),
            max_connections: 100,
            root: Utf8PathBuf::from("/var/gopher"),
            request_timeout: 10,
            server_host: "localhost".to_string(),
            server_port: 0,
            user: String::new(),
            response_timeout: 10,
            excluded: ExcludedExtensions::default(),
        }
    }
}

impl Config {
    /// Read deadline for the request line, if one is configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout))
    }

    /// Write-progress deadline for response streaming, if one is configured.
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.response_timeout > 0).then(|| Duration::from_secs(self.response_timeout))
    }

    pub fn adopt_listen_port(&mut self, port: u16) {
        if self.server_port == 0 {
            self.server_port = port;
        }
    }
}

/// Extensions that are never served nor considered script candidates.
///
/// Every entry starts with a dot and contains no further dot.
#[derive(Debug, Clone, Default)]
pub struct ExcludedExtensions(BTreeSet<String>);

impl ExcludedExtensions {
    /// Adds `extension`, accepted with or without its leading dot.
    pub fn add(&mut self, extension: &str) -> Result<(), String> {
        let bare = extension.strip_prefix('.').unwrap_or(extension);
        if bare.is_empty() || bare.contains('.') {
            return Err(format!("invalid excluded extension {extension:?}"));
        }
        self.0.insert(format!(".{bare}"));
        Ok(())
    }

    /// True when `extension` (dot included) is excluded.
    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(extension)
    }

    /// True when `path` has an excluded extension.
    pub fn matches(&self, path: &Utf8Path) -> bool {
        match path.extension() {
            Some(extension) => self.0.contains(&format!(".{extension}")),
            None => false,
        }
    }
}
