use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::{CONTROL_PORT, TRANSFER_PORT};

/// Connect timeout for every outbound call
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read size for file streaming on both sides
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_MAX_HEADER_LEN: usize = 1024 * 1024;
/// Profile pictures travel inline as data URLs
pub const DEFAULT_MAX_CONTROL_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Transport configuration struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Address both listeners bind to
    pub bind_address: IpAddr,

    /// Control channel port, 0 for an ephemeral port
    pub control_port: u16,

    /// Transfer channel port, 0 for an ephemeral port
    pub transfer_port: u16,

    pub connect_timeout: Duration,

    /// Longest a receive may stall before it is dropped as incomplete.
    /// `None` lets a sender stay paused indefinitely.
    pub transfer_idle_timeout: Option<Duration>,

    pub chunk_size: usize,

    pub max_header_len: usize,

    pub max_control_message_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            control_port: CONTROL_PORT,
            transfer_port: TRANSFER_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            transfer_idle_timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            max_control_message_len: DEFAULT_MAX_CONTROL_MESSAGE_LEN,
        }
    }
}

impl TransportConfig {
    /// Create a new TransportConfig with custom settings
    pub fn new(
        bind_address: Option<IpAddr>,
        control_port: Option<u16>,
        transfer_port: Option<u16>,
    ) -> Self {
        let mut config = Self::default();

        if let Some(addr) = bind_address {
            config.bind_address = addr;
        }

        if let Some(port) = control_port {
            config.control_port = port;
        }

        if let Some(port) = transfer_port {
            config.transfer_port = port;
        }

        config
    }

    /// Loopback listeners on ephemeral ports
    pub fn ephemeral() -> Self {
        Self::new(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), Some(0), Some(0))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transfer_idle_timeout = timeout;
        self
    }

    /// Get the socket address of the control listener
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.control_port)
    }

    /// Get the socket address of the transfer listener
    pub fn transfer_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.transfer_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.control_port, 47777);
        assert_eq!(config.transfer_port, 47778);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.transfer_idle_timeout, None);
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.control_addr().to_string(), "0.0.0.0:47777");
    }

    #[test]
    fn test_custom_config() {
        let config = TransportConfig::new(None, Some(9000), None);
        assert_eq!(config.control_port, 9000);
        assert_eq!(config.transfer_port, TRANSFER_PORT);

        let ephemeral = TransportConfig::ephemeral().with_chunk_size(0);
        assert_eq!(ephemeral.transfer_addr().to_string(), "127.0.0.1:0");
        assert_eq!(ephemeral.chunk_size, 1);
    }
}
