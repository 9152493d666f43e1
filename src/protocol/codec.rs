//! Framing of the transfer channel.
//!
//! `[u32 big-endian header length][header JSON][raw file bytes until EOF]`

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::HEADER_LEN_PREFIX;
use crate::core::{FileHeader, TransportError};

/// Length-prefixed JSON encoding of a header
pub fn encode_header(header: &FileHeader) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(header)?;
    let len = u32::try_from(json.len())
        .map_err(|_| TransportError::InvalidHeader("header too large".to_string()))?;

    let mut frame = Vec::with_capacity(HEADER_LEN_PREFIX + json.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Write the header frame; file bytes follow on the same stream
pub async fn write_header<W>(io: &mut W, header: &FileHeader) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_header(header)?;
    io.write_all(&frame).await?;
    io.flush().await?;
    Ok(())
}

/// Read exactly one header frame, leaving the stream positioned at the first file byte
pub async fn read_header<R>(io: &mut R, max_len: usize) -> Result<FileHeader, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; HEADER_LEN_PREFIX];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len == 0 {
        return Err(TransportError::InvalidHeader("empty header".to_string()));
    }
    if len > max_len {
        return Err(TransportError::InvalidHeader(format!(
            "header length {} exceeds limit {}",
            len, max_len
        )));
    }

    let mut buffer = vec![0u8; len];
    io.read_exact(&mut buffer).await?;

    Ok(serde_json::from_slice(&buffer)?)
}
