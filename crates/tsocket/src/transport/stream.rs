//! Accepted socket streams and the line-framed reader over them.

use std::mem;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::protocol::FrameError;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Stream types accepted by the listener, split into halves.
pub(crate) struct ConnectionStream {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl ConnectionStream {
    pub(crate) fn tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    #[cfg(unix)]
    pub(crate) fn unix(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Wraps any bidirectional byte stream.
    #[cfg(test)]
    pub(crate) fn from_io<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub(crate) fn into_split(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

/// Reads newline-terminated frames no longer than `limit` bytes.
///
/// Partial lines stay buffered across calls, so `next_line` may be raced in
/// `tokio::select!` without losing data.
pub(crate) struct FrameReader {
    reader: BufReader<BoxedReader>,
    buffer: Vec<u8>,
    limit: usize,
}

impl FrameReader {
    pub(crate) fn new(reader: BoxedReader, limit: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::new(),
            limit,
        }
    }

    /// Returns the next line without its terminator, or `None` at end of
    /// stream. A final unterminated line is returned as a frame.
    pub(crate) async fn next_line(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            let budget = self.limit.saturating_add(1).saturating_sub(self.buffer.len());
            let read = (&mut self.reader)
                .take(budget as u64)
                .read_until(b'\n', &mut self.buffer)
                .await?;

            if self.buffer.last() == Some(&b'\n') {
                self.buffer.pop();
                return Ok(Some(mem::take(&mut self.buffer)));
            }
            if self.buffer.len() > self.limit {
                return Err(FrameError::TooLarge { limit: self.limit });
            }
            if read == 0 {
                return Ok(if self.buffer.is_empty() {
                    None
                } else {
                    Some(mem::take(&mut self.buffer))
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn reader_over(bytes: &'static [u8], limit: usize) -> FrameReader {
        FrameReader::new(Box::new(bytes), limit)
    }

    #[tokio::test]
    async fn splits_lines_and_returns_trailing_fragment() {
        let mut frames = reader_over(b"one\ntwo\nthree", 64);
        assert_eq!(frames.next_line().await.expect("one"), Some(b"one".to_vec()));
        assert_eq!(frames.next_line().await.expect("two"), Some(b"two".to_vec()));
        assert_eq!(
            frames.next_line().await.expect("three"),
            Some(b"three".to_vec())
        );
        assert_eq!(frames.next_line().await.expect("eof"), None);
    }

    #[tokio::test]
    async fn lines_at_the_limit_are_accepted() {
        let mut frames = reader_over(b"abcd\n", 4);
        assert_eq!(frames.next_line().await.expect("line"), Some(b"abcd".to_vec()));
    }

    #[tokio::test]
    async fn oversize_lines_are_rejected() {
        let mut frames = reader_over(b"abcde\n", 4);
        let error = frames.next_line().await.expect_err("line too long");
        assert!(matches!(error, FrameError::TooLarge { limit: 4 }));
        assert!(!error.is_recoverable());
    }

    #[tokio::test]
    async fn frames_survive_split_writes() {
        let (client, server) = tokio::io::duplex(64);
        let (reader, _writer) = ConnectionStream::from_io(server).into_split();
        let mut frames = FrameReader::new(reader, 64);
        let mut client = client;

        let writer = tokio::spawn(async move {
            client.write_all(b"{\"event\":").await.expect("first half");
            tokio::task::yield_now().await;
            client.write_all(b"\"ping\"}\n").await.expect("second half");
            client
        });

        let line = frames.next_line().await.expect("line").expect("frame");
        assert_eq!(line, b"{\"event\":\"ping\"}".to_vec());
        drop(writer.await.expect("writer task"));
    }
}
