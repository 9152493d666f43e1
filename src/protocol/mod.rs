pub mod codec;
pub mod control;
pub mod pairing;

pub use codec::{encode_header, read_header, write_header};
pub use control::{ControlDecoder, ControlMessage, Decoded};
pub use pairing::{PairingInvite, generate_pairing_link, parse_pairing_link};

/// Port of the control channel
pub const CONTROL_PORT: u16 = 47777;
/// Port of the transfer channel
pub const TRANSFER_PORT: u16 = 47778;

/// Size of the big-endian length prefix in front of a file header
pub const HEADER_LEN_PREFIX: usize = 4;

/// Received bytes must reach this fraction of the announced size for a
/// transfer to count as complete
pub const COMPLETION_TOLERANCE: f64 = 0.99;

/// Whether `received` bytes satisfy the completion rule for a file of `expected` bytes
pub fn is_complete(received: u64, expected: u64) -> bool {
    received as f64 >= expected as f64 * COMPLETION_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_constants() {
        assert_eq!(CONTROL_PORT, 47777);
        assert_eq!(TRANSFER_PORT, 47778);
        assert_ne!(CONTROL_PORT, TRANSFER_PORT);
    }

    #[test]
    fn test_completion_tolerance() {
        assert!(is_complete(10_000, 10_000));
        assert!(is_complete(9_900, 10_000));
        assert!(!is_complete(9_899, 10_000));
        assert!(is_complete(0, 0));
        assert!(is_complete(12, 10));
    }
}
