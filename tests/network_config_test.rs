use polyhub::network::config::{DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT};
use polyhub::protocol::{CONTROL_PORT, TRANSFER_PORT};
use polyhub::{AppConfig, TransportConfig};
use std::net::SocketAddr;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = TransportConfig::default();

    // Check default values
    assert_eq!(config.control_port, CONTROL_PORT);
    assert_eq!(config.transfer_port, TRANSFER_PORT);
    assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    assert!(config.transfer_idle_timeout.is_none());
}

#[test]
fn test_custom_port_config() {
    let config = TransportConfig::new(None, Some(12345), Some(12346));

    assert_eq!(config.control_port, 12345);
    assert_eq!(config.transfer_port, 12346);
    assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
}

#[test]
fn test_get_socket_addrs() {
    let config = TransportConfig::new(None, Some(8080), None);

    match config.control_addr() {
        SocketAddr::V4(addr) => {
            assert_eq!(addr.port(), 8080);
            assert!(addr.ip().is_unspecified());
        }
        SocketAddr::V6(_) => panic!("default bind address is IPv4"),
    }
    assert_eq!(config.transfer_addr().port(), TRANSFER_PORT);
}

#[test]
fn test_app_config_drives_transport() {
    let mut app = AppConfig::default();
    app.network.bind_address = "127.0.0.1".to_string();
    app.network.control_port = 0;
    app.network.transfer_port = 0;
    app.network.connection_timeout_seconds = 2;
    app.network.transfer_idle_timeout_seconds = Some(60);
    app.network.chunk_size = 4096;
    app.validate().expect("ephemeral ports are valid");

    let config = app.transport_config().unwrap();
    assert_eq!(config.control_addr().to_string(), "127.0.0.1:0");
    assert_eq!(config.connect_timeout, Duration::from_secs(2));
    assert_eq!(config.transfer_idle_timeout, Some(Duration::from_secs(60)));
    assert_eq!(config.chunk_size, 4096);
}
