//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::warn;

/// Longest line kept before it is dropped as noise
pub const MAX_LINE_LEN: usize = 1024;

/// Trait for the inbound half of a line-oriented serial link
#[async_trait]
pub trait LineSource: Send {
    /// Read the next complete line, terminator included
    ///
    /// Must be cancel safe: bytes received before the future is dropped are
    /// kept for the next call.
    async fn read_line(&mut self) -> io::Result<Bytes>;
}

/// Trait for the outbound half of a serial link
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSink: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Line reader over any async byte stream (a serial read half in production)
pub struct SerialReader<R> {
    inner: BufReader<R>,
    pending: BytesMut,
    discarding: bool,
}

impl<R: AsyncRead + Unpin + Send> SerialReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            pending: BytesMut::with_capacity(256),
            discarding: false,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineSource for SerialReader<R> {
    async fn read_line(&mut self) -> io::Result<Bytes> {
        loop {
            let available = self.inner.fill_buf().await?;

            if available.is_empty() {
                if self.pending.is_empty() || self.discarding {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial stream closed",
                    ));
                }
                return Ok(self.pending.split().freeze());
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(idx) => {
                    let consumed = idx + 1;
                    let keep = !self.discarding && self.pending.len() + consumed <= MAX_LINE_LEN;
                    if keep {
                        self.pending.extend_from_slice(&available[..consumed]);
                    } else if !self.discarding {
                        warn!(
                            "Dropping serial line longer than {} bytes",
                            MAX_LINE_LEN
                        );
                        self.pending.clear();
                    }
                    self.inner.consume(consumed);
                    self.discarding = false;

                    if keep {
                        return Ok(self.pending.split().freeze());
                    }
                }
                None => {
                    let consumed = available.len();
                    if !self.discarding {
                        self.pending.extend_from_slice(available);
                    }
                    self.inner.consume(consumed);

                    if self.pending.len() > MAX_LINE_LEN {
                        warn!(
                            "Dropping serial line longer than {} bytes",
                            MAX_LINE_LEN
                        );
                        self.pending.clear();
                        self.discarding = true;
                    }
                }
            }
        }
    }
}

/// Frame writer over any async byte sink (a serial write half in production)
pub struct SerialWriter<W> {
    port: W,
}

impl<W: AsyncWrite + Unpin + Send> SerialWriter<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for SerialWriter<W> {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_reader_reassembles_split_lines() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"currentAirTemp\":")
            .read(b"45.2}\n{\"a\"")
            .read(b":1}\r\n")
            .build();
        let mut reader = SerialReader::new(mock);

        assert_eq!(&reader.read_line().await.unwrap()[..], b"{\"currentAirTemp\":45.2}\n");
        assert_eq!(&reader.read_line().await.unwrap()[..], b"{\"a\":1}\r\n");
    }

    #[tokio::test]
    async fn test_reader_returns_unterminated_tail_then_eof() {
        let mock = tokio_test::io::Builder::new().read(b"partial").build();
        let mut reader = SerialReader::new(mock);

        assert_eq!(&reader.read_line().await.unwrap()[..], b"partial");
        let err = reader.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_reader_drops_overlong_lines() {
        let noise = vec![b'x'; MAX_LINE_LEN + 10];
        let mock = tokio_test::io::Builder::new()
            .read(&noise)
            .read(b"still noise\n")
            .read(b"ok\n")
            .build();
        let mut reader = SerialReader::new(mock);

        assert_eq!(&reader.read_line().await.unwrap()[..], b"ok\n");
    }

    #[tokio::test]
    async fn test_reader_drops_overlong_line_in_one_chunk() {
        let mut noise = vec![b'x'; 4000];
        noise.extend_from_slice(b"\nok\n");
        let mock = tokio_test::io::Builder::new().read(&noise).build();
        let mut reader = SerialReader::new(mock);

        assert_eq!(&reader.read_line().await.unwrap()[..], b"ok\n");
    }

    #[tokio::test]
    async fn test_reader_drops_overlong_line_finished_in_next_chunk() {
        let head = vec![b'x'; 1000];
        let mut tail = vec![b'x'; 500];
        tail.push(b'\n');
        let mock = tokio_test::io::Builder::new()
            .read(&head)
            .read(&tail)
            .read(b"ok\n")
            .build();
        let mut reader = SerialReader::new(mock);

        let line = reader.read_line().await.unwrap();
        assert!(line.len() <= MAX_LINE_LEN);
        assert_eq!(&line[..], b"ok\n");
    }

    #[tokio::test]
    async fn test_reader_keeps_line_at_limit() {
        let mut line = vec![b'y'; MAX_LINE_LEN - 1];
        line.push(b'\n');
        let mock = tokio_test::io::Builder::new().read(&line).build();
        let mut reader = SerialReader::new(mock);

        assert_eq!(reader.read_line().await.unwrap().len(), MAX_LINE_LEN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_keeps_partial_line_across_cancellation() {
        let (mut device, host) = tokio::io::duplex(64);
        let mut reader = SerialReader::new(host);

        device.write_all(b"{\"half\":").await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(50), reader.read_line()).await;
        assert!(timed_out.is_err());

        device.write_all(b"true}\n").await.unwrap();
        assert_eq!(&reader.read_line().await.unwrap()[..], b"{\"half\":true}\n");
    }

    #[tokio::test]
    async fn test_writer_passes_bytes_through() {
        let mock = tokio_test::io::Builder::new().write(b"{\"preset\":\"OFF\"}\n").build();
        let mut writer = SerialWriter::new(mock);

        writer.write_all(b"{\"preset\":\"OFF\"}\n").await.unwrap();
        writer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_serial_port_records_writes() {
        let mut port = mocks::MockSerialPort::new();
        port.write_all(b"one\n").await.unwrap();
        port.write_all(b"two\n").await.unwrap();

        assert_eq!(port.get_written_data(), vec![b"one\n".to_vec(), b"two\n".to_vec()]);

        port.set_write_error(io::ErrorKind::BrokenPipe);
        assert!(port.write_all(b"three\n").await.is_err());
    }
}
