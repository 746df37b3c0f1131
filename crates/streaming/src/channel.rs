//! Duplex channels carrying frames between the two peers.

use crate::error::Result;
use crate::protocol::{Frame, FrameCodec};

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

/// Outbound half of a channel.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = io::Error> + Send>>;

/// Inbound half of a channel. The stream ends when the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = io::Result<Frame>> + Send>>;

/// A connected channel split into its outbound and inbound halves.
pub struct DuplexChannel {
    sink: FrameSink,
    stream: FrameStream,
}

impl DuplexChannel {
    /// Build a channel from an already framed sink and stream.
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Frame, Error = io::Error> + Send + 'static,
        R: Stream<Item = io::Result<Frame>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Build a channel over a pair of byte streams, writing frames back to back.
    pub fn from_io<R, W>(reader: R, writer: W, max_frame_size: usize) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let codec = FrameCodec::new().with_max_frame_size(max_frame_size);
        Self::new(
            FramedWrite::new(writer, codec),
            FramedRead::new(reader, codec),
        )
    }

    /// Split into sink and stream.
    pub fn into_parts(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl std::fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexChannel").finish_non_exhaustive()
    }
}

/// Source of connected channels for a transport server.
///
/// Each successful `open` yields a fresh channel; the server calls it once per
/// connection attempt.
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    /// Human readable name used in logs and disconnect events.
    fn name(&self) -> &str;

    /// Establish a new channel, waiting for the peer as needed.
    async fn open(&self, max_frame_size: usize) -> Result<DuplexChannel>;
}
