use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ProfileSnapshot, TransportError};

/// Messages carried by the control channel, one JSON document each
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    PairRequest {
        name: String,
        ip: String,
        #[serde(rename = "profilePicture", default)]
        profile_picture: Option<String>,
    },
    PairAck {
        success: bool,
    },
    /// Legacy metadata-only announcement; `file` is passed through untouched
    FileAnnounce {
        file: Value,
        from: ProfileSnapshot,
    },
    FileDelete {
        #[serde(rename = "fileId")]
        file_id: String,
        from: ProfileSnapshot,
    },
    ProfileUpdate {
        profile: ProfileSnapshot,
    },
}

impl ControlMessage {
    pub fn pair_request(profile: &ProfileSnapshot) -> Self {
        ControlMessage::PairRequest {
            name: profile.name.clone(),
            ip: profile.ip.clone(),
            profile_picture: profile.profile_picture.clone(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::PairRequest { .. } => "PAIR_REQUEST",
            ControlMessage::PairAck { .. } => "PAIR_ACK",
            ControlMessage::FileAnnounce { .. } => "FILE_ANNOUNCE",
            ControlMessage::FileDelete { .. } => "FILE_DELETE",
            ControlMessage::ProfileUpdate { .. } => "PROFILE_UPDATE",
        }
    }
}

/// One complete JSON document pulled off a control connection
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Message(ControlMessage),
    /// Well-formed JSON that is not a known control message
    Unknown { kind: String },
}

/// Incremental decoder for control connections
///
/// Bytes are accumulated and every complete JSON document in the buffer is
/// returned; a partial trailing document stays buffered for the next chunk.
#[derive(Debug)]
pub struct ControlDecoder {
    buffer: Vec<u8>,
    max_len: usize,
}

impl ControlDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
        }
    }

    /// Bytes received but not yet part of a complete document
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Decoded>, TransportError> {
        let waiting = !self.buffer.is_empty();
        self.buffer.extend_from_slice(chunk);

        // A buffered partial document can only complete at one of these bytes,
        // so a chunk without them skips the re-parse of the whole buffer.
        if waiting && !chunk.iter().any(|&b| ends_value(b)) {
            self.check_len()?;
            return Ok(Vec::new());
        }

        let mut decoded = Vec::new();
        let mut consumed = 0;
        {
            let mut stream = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        consumed = stream.byte_offset();
                        decoded.push(classify(value));
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => return Err(TransportError::InvalidMessage(e.to_string())),
                    None => {
                        consumed = stream.byte_offset();
                        break;
                    }
                }
            }
        }
        self.buffer.drain(..consumed);

        self.check_len()?;
        Ok(decoded)
    }

    fn check_len(&self) -> Result<(), TransportError> {
        if self.buffer.len() > self.max_len {
            return Err(TransportError::InvalidMessage(format!(
                "message exceeds {} bytes",
                self.max_len
            )));
        }
        Ok(())
    }
}

fn ends_value(byte: u8) -> bool {
    matches!(byte, b'}' | b']' | b'"') || byte.is_ascii_whitespace()
}

fn classify(value: Value) -> Decoded {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
        .to_string();
    match serde_json::from_value::<ControlMessage>(value) {
        Ok(message) => Decoded::Message(message),
        Err(_) => Decoded::Unknown { kind },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_request_wire_shape() {
        let mut profile = ProfileSnapshot::new("Alice", "100.1.1.1");
        profile.profile_picture = Some("data:image/png;base64,AAAA".to_string());
        let json: Value = serde_json::from_slice(&ControlMessage::pair_request(&profile).encode().unwrap()).unwrap();

        assert_eq!(json["type"], "PAIR_REQUEST");
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["ip"], "100.1.1.1");
        assert_eq!(json["profilePicture"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_file_delete_wire_shape() {
        let raw = r#"{"type":"FILE_DELETE","fileId":"abc","from":{"name":"Bob","ip":"100.2.2.2"}}"#;
        let parsed: ControlMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed,
            ControlMessage::FileDelete {
                file_id: "abc".to_string(),
                from: ProfileSnapshot::new("Bob", "100.2.2.2"),
            }
        );
        assert_eq!(parsed.kind(), "FILE_DELETE");
    }

    #[test]
    fn test_decoder_waits_for_complete_document() {
        let mut decoder = ControlDecoder::new(1024);
        let raw = br#"{"type":"PAIR_ACK","success":true}"#;

        assert!(decoder.push(&raw[..10]).unwrap().is_empty());
        assert_eq!(decoder.pending(), 10);

        let decoded = decoder.push(&raw[10..]).unwrap();
        assert_eq!(decoded, vec![Decoded::Message(ControlMessage::PairAck { success: true })]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_handles_pipelined_documents() {
        let mut decoder = ControlDecoder::new(1024);
        let raw = br#"{"type":"PAIR_ACK","success":true}{"type":"PROFILE_UPDATE","profile":{"name":"A","ip":"1"}}{"type":"PAIR"#;

        let decoded = decoder.push(raw).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[1], Decoded::Message(ControlMessage::ProfileUpdate { .. })));
        assert_eq!(decoder.pending(), br#"{"type":"PAIR"#.len());
    }

    #[test]
    fn test_decoder_reports_unknown_type() {
        let mut decoder = ControlDecoder::new(1024);
        let decoded = decoder.push(br#"{"type":"HELLO"}"#).unwrap();
        assert_eq!(decoded, vec![Decoded::Unknown { kind: "HELLO".to_string() }]);
    }

    #[test]
    fn test_decoder_large_picture_in_small_chunks() {
        let mut profile = ProfileSnapshot::new("Alice", "100.1.1.1");
        profile.profile_picture = Some(format!("data:image/png;base64,{}", "A".repeat(200_000)));
        let raw = ControlMessage::pair_request(&profile).encode().unwrap();

        let mut decoder = ControlDecoder::new(1024 * 1024);
        let mut decoded = Vec::new();
        for chunk in raw.chunks(512) {
            decoded.extend(decoder.push(chunk).unwrap());
        }
        assert_eq!(
            decoded,
            vec![Decoded::Message(ControlMessage::pair_request(&profile))]
        );
        assert_eq!(decoder.pending(), 0);

        let mut small = ControlDecoder::new(4096);
        let failed = raw.chunks(512).map(|chunk| small.push(chunk)).find(Result::is_err);
        assert!(failed.is_some());
    }

    #[test]
    fn test_decoder_rejects_garbage_and_oversize() {
        let mut decoder = ControlDecoder::new(1024);
        assert!(decoder.push(b"not json").is_err());

        let mut small = ControlDecoder::new(8);
        assert!(small.push(br#"{"type":"PAIR_REQUEST","name":"#).is_err());
    }
}
