use crate::logging::LogFormat;
use crate::ports::PortList;

/// Host both binaries use when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Ports the server listens on by default.
pub const DEFAULT_LISTEN_PORTS: [u16; 4] = [10080, 10081, 10082, 10083];

/// Ports the client ships chunks to by default.
pub const DEFAULT_DESTINATION_PORTS: [u16; 1] = [10082];

/// Port the client receives results on by default.
pub const DEFAULT_REPLY_PORT: u16 = 10081;

/// Default size of the server's compute pool.
pub const DEFAULT_WORKER_THREADS: usize = 5;

/// Default cap on client sender threads.
pub const DEFAULT_MAX_SENDER_THREADS: usize = 4;

/// Default client request deadline in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned host value used where allocation is required (e.g. serde).
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default server listening ports.
pub fn default_listen_ports() -> PortList {
    PortList::from(DEFAULT_LISTEN_PORTS.to_vec())
}

/// Default client destination ports.
pub fn default_destination_ports() -> PortList {
    PortList::from(DEFAULT_DESTINATION_PORTS.to_vec())
}

pub(crate) fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

pub(crate) fn default_reply_port() -> u16 {
    DEFAULT_REPLY_PORT
}

pub(crate) fn default_max_sender_threads() -> usize {
    DEFAULT_MAX_SENDER_THREADS
}

pub(crate) fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
