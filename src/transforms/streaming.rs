//! Incremental relay of upstream bodies.
//!
//! Upstream chunks are re-cut into frames of at most [`RELAY_CHUNK_SIZE`]
//! bytes; hyper flushes each frame to the client as it is produced, so a
//! slow event stream reaches the client as it arrives instead of being
//! buffered. A read error ends the response early without an error frame;
//! a client that goes away drops the stream, which is logged.

use async_stream::stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::constants::RELAY_CHUNK_SIZE;

/// Logs a client disconnect when the relay stream is dropped mid-body
struct RelayGuard {
    relayed: usize,
    finished: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if self.finished {
            debug!("Relay finished after {} bytes", self.relayed);
        } else {
            warn!(
                "Error writing to client: connection closed after {} bytes",
                self.relayed
            );
        }
    }
}

pub fn relay_body<S>(body: S) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    rechunk(body, RELAY_CHUNK_SIZE)
}

/// Split every chunk of `body` into pieces of at most `chunk_size` bytes,
/// preserving order.
pub fn rechunk<S>(
    body: S,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    stream! {
        let mut guard = RelayGuard { relayed: 0, finished: false };
        let mut body = std::pin::pin!(body);

        while let Some(chunk) = body.next().await {
            let mut chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    warn!("Error reading from response body: {e}");
                    guard.finished = true;
                    yield Err(e);
                    return;
                }
            };

            while !chunk.is_empty() {
                let piece = chunk.split_to(chunk.len().min(chunk_size));
                guard.relayed += piece.len();
                yield Ok(piece);
            }
        }

        guard.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(sizes: &[usize]) -> (Vec<Result<Bytes, std::io::Error>>, Vec<u8>) {
        let mut all = Vec::new();
        let mut out = Vec::new();
        for (i, size) in sizes.iter().enumerate() {
            let data: Vec<u8> = (0..*size).map(|j| ((i * 31 + j) % 251) as u8).collect();
            all.extend_from_slice(&data);
            out.push(Ok(Bytes::from(data)));
        }
        (out, all)
    }

    #[tokio::test]
    async fn test_rechunk_preserves_bytes_and_order() {
        let (input, expected) = chunks(&[1, 5000, 4096, 0, 10_000, 3, 8192]);
        let frames: Vec<Bytes> = relay_body(stream::iter(input))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert!(frames.iter().all(|f| !f.is_empty() && f.len() <= RELAY_CHUNK_SIZE));
        assert_eq!(frames.concat(), expected);
    }

    #[tokio::test]
    async fn test_large_single_chunk_is_split() {
        let (input, expected) = chunks(&[RELAY_CHUNK_SIZE * 2 + 17]);
        let frames: Vec<Bytes> = relay_body(stream::iter(input))
            .map(|r| r.unwrap())
            .collect()
            .await;

        let sizes: Vec<usize> = frames.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![RELAY_CHUNK_SIZE, RELAY_CHUNK_SIZE, 17]);
        assert_eq!(frames.concat(), expected);
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let input = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err(std::io::Error::other("reset by peer")),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let items: Vec<_> = rechunk(stream::iter(input), 4).collect().await;

        // "data: one\n\n" is 11 bytes: three frames, then the error, then nothing
        assert_eq!(items.len(), 4);
        assert!(items[..3].iter().all(Result::is_ok));
        assert!(items[3].is_err());
    }
}
