//! Byte transport seam.
//!
//! The session manager and the dispatcher only need an ordered byte pipe.
//! Read boundaries carry no meaning; the reassembler restores framing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Result;

#[async_trait::async_trait]
pub trait Transport: Send {
    /// Write all of `data` and flush it.
    async fn send_data(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever is available into `buf`. `Ok(0)` means the peer closed.
    ///
    /// Must be cancel safe: the session drops this future whenever another
    /// event wins the race.
    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Adapts any tokio byte stream (TCP bridge socket, in-memory duplex).
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait::async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf).await?)
    }
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_data(data).await
    }

    async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_data(buf).await
    }
}
