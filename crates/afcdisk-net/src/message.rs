use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetError;

pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Magic number stored in the low byte of `checksum`.
pub const MESSAGE_MAGIC_NUM: u8 = 0x86;

/// Largest payload accepted on the wire (64 MiB). Reads are capped at 1 MiB
/// by the services, so this leaves plenty of headroom.
pub const MESSAGE_MAX_SIZE: usize = 64 * 1024 * 1024;

/// Frame header: `[checksum: u32 LE][size: u32 LE]`.
///
/// The checksum is the CRC32C of the payload with its low byte replaced by
/// [`MESSAGE_MAGIC_NUM`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub checksum: u32,
    pub size: u32,
}

impl MessageHeader {
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            checksum: calc_checksum(payload),
            size: payload.len() as u32,
        }
    }

    pub fn has_magic(&self) -> bool {
        (self.checksum & 0xFF) == MESSAGE_MAGIC_NUM as u32
    }

    pub fn from_bytes(data: &[u8; MESSAGE_HEADER_SIZE]) -> Self {
        let checksum = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Self { checksum, size }
    }

    pub fn to_bytes(&self) -> [u8; MESSAGE_HEADER_SIZE] {
        let mut buf = [0u8; MESSAGE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.checksum.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Check magic and size before the payload is read.
    pub fn check_preamble(&self) -> Result<(), NetError> {
        if !self.has_magic() {
            return Err(NetError::InvalidMagic((self.checksum & 0xFF) as u8));
        }
        let size = self.size as usize;
        if size > MESSAGE_MAX_SIZE {
            return Err(NetError::MessageTooLarge {
                size,
                max: MESSAGE_MAX_SIZE,
            });
        }
        Ok(())
    }

    pub fn validate(&self, payload: &[u8]) -> Result<(), NetError> {
        self.check_preamble()?;
        let expected = calc_checksum(payload);
        if self.checksum != expected {
            return Err(NetError::ChecksumMismatch {
                expected,
                actual: self.checksum,
            });
        }
        Ok(())
    }
}

pub fn calc_checksum(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    (crc & !0xff) | (MESSAGE_MAGIC_NUM as u32)
}

/// Write one framed message and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MESSAGE_MAX_SIZE {
        return Err(NetError::MessageTooLarge {
            size: payload.len(),
            max: MESSAGE_MAX_SIZE,
        });
    }
    let header = MessageHeader::for_payload(payload);
    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message and verify its checksum.
///
/// A clean EOF before the first header byte is reported as
/// [`NetError::ConnectionClosed`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; MESSAGE_HEADER_SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(NetError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let header = MessageHeader::from_bytes(&header_buf);
    header.check_preamble()?;

    let mut payload = vec![0u8; header.size as usize];
    reader.read_exact(&mut payload).await?;
    header.validate(&payload)?;
    Ok(Bytes::from(payload))
}
