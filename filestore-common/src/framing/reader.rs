//! Frame decoding
//!
//! Fields are read one at a time so every limit is checked before the bytes
//! it guards are buffered: the type before its name is trusted, the payload
//! length before the payload is allocated.

use std::io;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use super::error::FrameError;
use super::frame::RawFrame;
use super::limits::{is_known_message_type, max_payload_for_type};
use super::message_id::MessageId;
use super::{
    DELIMITER, MAGIC, MAX_PAYLOAD_LENGTH_DIGITS, MAX_TYPE_LENGTH, MAX_TYPE_LENGTH_DIGITS,
    MSG_ID_LENGTH, TERMINATOR,
};

/// Time allowed to finish a frame once its first byte has arrived
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(60);

/// Time allowed between frames of an upload stream
pub const DEFAULT_PROGRESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Decodes frames from a byte stream
pub struct FrameReader<R> {
    reader: R,
}

impl<R> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: AsyncReadExt + Unpin> FrameReader<R> {
    /// Read one frame with no time limit
    ///
    /// `Ok(None)` means the peer closed the stream on a frame boundary.
    pub async fn read_frame(&mut self) -> Result<Option<RawFrame>, FrameError> {
        match self.first_byte().await? {
            Some(byte) => self.finish_frame(byte).await.map(Some),
            None => Ok(None),
        }
    }

    /// Read one frame, bounding only the time spent inside it
    ///
    /// An idle connection may wait forever for the first byte; after that
    /// the rest of the frame has `frame_timeout` to arrive.
    pub async fn read_frame_with_timeout(
        &mut self,
        frame_timeout: Duration,
    ) -> Result<Option<RawFrame>, FrameError> {
        let Some(byte) = self.first_byte().await? else {
            return Ok(None);
        };
        timeout(frame_timeout, self.finish_frame(byte))
            .await
            .map_err(|_| FrameError::FrameTimeout)?
            .map(Some)
    }

    async fn finish_frame(&mut self, first: u8) -> Result<RawFrame, FrameError> {
        if first != MAGIC[0] {
            return Err(FrameError::InvalidMagic);
        }
        let mut rest = [0u8; 2];
        self.reader.read_exact(&mut rest).await?;
        if rest != MAGIC[1..] {
            return Err(FrameError::InvalidMagic);
        }

        let message_type = self.read_message_type().await?;

        let mut id = [0u8; MSG_ID_LENGTH];
        self.reader.read_exact(&mut id).await?;
        let message_id = MessageId::from_bytes(&id)?;
        self.expect(DELIMITER, FrameError::MissingDelimiter).await?;

        let length = self
            .read_decimal(
                MAX_PAYLOAD_LENGTH_DIGITS,
                FrameError::InvalidPayloadLength,
                FrameError::PayloadLengthTooManyDigits,
            )
            .await?;
        let max = max_payload_for_type(&message_type);
        if length > max {
            return Err(FrameError::PayloadLengthExceedsTypeMax {
                message_type,
                length,
                max,
            });
        }

        let mut payload = vec![0u8; length as usize];
        self.reader.read_exact(&mut payload).await?;
        self.expect(TERMINATOR, FrameError::MissingTerminator).await?;

        Ok(RawFrame::new(message_id, message_type, payload))
    }

    /// Length-prefixed type name, followed by its delimiter
    async fn read_message_type(&mut self) -> Result<String, FrameError> {
        let len = self
            .read_decimal(
                MAX_TYPE_LENGTH_DIGITS,
                FrameError::InvalidTypeLength,
                FrameError::TypeLengthTooManyDigits,
            )
            .await?;
        if !(1..=MAX_TYPE_LENGTH as u64).contains(&len) {
            return Err(FrameError::TypeLengthOutOfRange);
        }

        let mut name = vec![0u8; len as usize];
        self.reader.read_exact(&mut name).await?;
        let name = String::from_utf8(name)
            .map_err(|_| FrameError::UnknownMessageType("<invalid utf8>".to_string()))?;
        if !is_known_message_type(&name) {
            return Err(FrameError::UnknownMessageType(name));
        }

        self.expect(DELIMITER, FrameError::MissingDelimiter).await?;
        Ok(name)
    }

    /// Decimal number of at most `max_digits`, terminated by a delimiter
    async fn read_decimal(
        &mut self,
        max_digits: usize,
        invalid: FrameError,
        too_long: FrameError,
    ) -> Result<u64, FrameError> {
        let mut value = 0u64;
        let mut digits = 0usize;
        loop {
            let byte = self.byte().await?;
            if byte == DELIMITER {
                return if digits == 0 { Err(invalid) } else { Ok(value) };
            }
            if !byte.is_ascii_digit() {
                return Err(invalid);
            }
            if digits == max_digits {
                return Err(too_long);
            }
            value = value * 10 + u64::from(byte - b'0');
            digits += 1;
        }
    }

    async fn first_byte(&mut self) -> Result<Option<u8>, FrameError> {
        let mut buf = [0u8; 1];
        match self.reader.read_exact(&mut buf).await {
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn byte(&mut self) -> Result<u8, FrameError> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf).await?;
        Ok(buf[0])
    }

    async fn expect(&mut self, byte: u8, err: FrameError) -> Result<(), FrameError> {
        if self.byte().await? == byte {
            Ok(())
        } else {
            Err(err)
        }
    }
}
