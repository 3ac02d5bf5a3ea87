//! Browser native-messaging transport
//!
//! Each message is a 4-byte little-endian length followed by that many bytes
//! of UTF-8 JSON, in both directions.

use crate::api::handler::RequestHandler;
use crate::api::messages::{WireError, WireResponse, ERROR_RESPONSE_TYPE};
use crate::errors::{Result, VaultError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Read one frame. `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_len {
        return Err(VaultError::InvalidRequest(format!(
            "Message of {} bytes exceeds limit of {}",
            len, max_len
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len())
        .map_err(|_| VaultError::InternalError("Response too large".to_string()))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Serve requests until the peer closes the stream.
///
/// An oversized frame cannot be skipped safely, so it ends the session
/// after an error reply.
pub async fn serve<R, W>(
    handler: &RequestHandler,
    mut reader: R,
    mut writer: W,
    max_len: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("Native messaging host ready");
    loop {
        let frame = match read_frame(&mut reader, max_len).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Peer closed the stream");
                return Ok(());
            }
            Err(err @ VaultError::InvalidRequest(_)) => {
                warn!("Dropping connection: {}", err);
                let response =
                    WireResponse::failure(ERROR_RESPONSE_TYPE, None, WireError::from_error(&err, None));
                write_frame(&mut writer, &serde_json::to_vec(&response)?).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        debug!("Received frame of {} bytes", frame.len());
        let response = handler.handle_raw(&frame).await;
        let body = serde_json::to_vec(&response)?;
        write_frame(&mut writer, &body).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, br#"{"type":"BAP_STATUS"}"#).await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        drop(a);

        let first = read_frame(&mut b, 1024).await.unwrap().unwrap();
        assert_eq!(first, br#"{"type":"BAP_STATUS"}"#);
        let empty = read_frame(&mut b, 1024).await.unwrap().unwrap();
        assert!(empty.is_empty());
        assert!(read_frame(&mut b, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_length_is_little_endian() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"abc").await.unwrap();
        let mut raw = [0u8; 7];
        b.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw, &[3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_oversize_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(2048u32).to_le_bytes()).await.unwrap();
        let result = read_frame(&mut b, 1024).await;
        assert!(matches!(result, Err(VaultError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_truncated_body_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(10u32).to_le_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        assert!(read_frame(&mut b, 1024).await.is_err());
    }
}
