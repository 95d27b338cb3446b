//! A byte-counting wrapper around a GET body stream, grounded in the
//! original daemon's `FileWrapper`/`SLOFileWrapper`: it lets a caller assert
//! the number of bytes actually streamed out against the `Content-Length`
//! it told the remote side to expect, catching a local object that changed
//! size mid-read.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// Shared counter a caller can read after the stream has been fully
/// consumed (or at any point, for a partial-progress readout).
#[derive(Clone, Default)]
pub struct BytesReadCounter(Arc<AtomicU64>);

impl BytesReadCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

pub struct CountingStream<S> {
    inner: S,
    counter: BytesReadCounter,
}

impl<S> CountingStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    pub fn new(inner: S) -> (Self, BytesReadCounter) {
        let counter = BytesReadCounter::default();
        (
            Self {
                inner,
                counter: counter.clone(),
            },
            counter,
        )
    }
}

impl<S> Stream for CountingStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.counter.0.fetch_add(chunk.len() as u64, Ordering::AcqRel);
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn counts_bytes_across_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let (mut stream, counter) = CountingStream::new(futures::stream::iter(chunks));
        while stream.next().await.is_some() {}
        assert_eq!(counter.get(), 5);
    }
}
