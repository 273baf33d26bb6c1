//! Line-protocol sink over an async byte stream.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{BatchSink, SinkError};
use crate::format::{encode_body, Point};

/// Writes each batch as one newline-delimited body and flushes the stream.
pub struct WriterSink<W> {
    destination: String,
    writer: Mutex<W>,
}

impl<W> WriterSink<W> {
    pub fn new(destination: impl Into<String>, writer: W) -> Self {
        Self {
            destination: destination.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W> std::fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSink")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<W> BatchSink<Point> for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&self, batch: Vec<Point>) -> Result<(), SinkError> {
        let body = encode_body(&batch);
        let records = batch.len();
        tracing::trace!(destination = %self.destination, body = %body, "Write body");

        let mut writer = self.writer.lock().await;
        let result = match writer.write_all(body.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            SinkError::new(self.destination.clone(), records, e).with_bytes(body.len())
        })
    }

    fn describe(&self) -> String {
        self.destination.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Writer that rejects every write.
    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn point(lines: &[&str]) -> Point {
        Point {
            name: "stats".into(),
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_writes_encoded_body() {
        let sink = WriterSink::new("memory", Vec::new());
        sink.write(vec![point(&["a 1"]), point(&["b 2", "c 3"])])
            .await
            .unwrap();
        sink.write(vec![point(&["d 4"])]).await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "a 1\nb 2\nc 3\nd 4\n");
    }

    #[tokio::test]
    async fn test_io_error_becomes_sink_error() {
        let sink = WriterSink::new("pipe:1", BrokenPipe);
        let err = sink
            .write(vec![point(&["x 1"]), point(&["y 2"])])
            .await
            .unwrap_err();

        assert_eq!(err.destination, "pipe:1");
        assert_eq!(err.records, 2);
        assert_eq!(err.bytes, Some(8));
        assert_eq!(sink.describe(), "pipe:1");
    }
}
