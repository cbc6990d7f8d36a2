//! Sequential packet I/O for the handshake phase of a connection, before it
//! is split into the reader/writer actor pair.

use std::io::ErrorKind;

use anyhow::bail;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use nexus_protocol::{FrameDecoder, FrameEncoder, Message, PacketFrame, SessionCipher};

use crate::HANDSHAKE_TIMEOUT;

const READ_BUF_SIZE: usize = 4096;

pub struct PacketIo {
    stream: TcpStream,
    enc: FrameEncoder,
    dec: FrameDecoder,
}

impl PacketIo {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            enc: FrameEncoder::new(),
            dec: FrameDecoder::new(),
        }
    }

    pub async fn send<M: Message>(&mut self, msg: &M) -> anyhow::Result<()> {
        self.enc.append_message(msg)?;
        let bytes = self.enc.take();
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    pub async fn recv_frame(&mut self) -> anyhow::Result<PacketFrame> {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            if let Some(frame) = self.dec.try_next_frame()? {
                return Ok(frame);
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                bail!(std::io::Error::from(ErrorKind::UnexpectedEof));
            }
            self.dec.queue_bytes(&buf[..n]);
        }
    }

    /// Receives one frame and decodes it as `M`, bounded by the handshake
    /// timeout.
    pub async fn recv<M: Message>(&mut self) -> anyhow::Result<M> {
        let frame = timeout(HANDSHAKE_TIMEOUT, self.recv_frame()).await??;
        Ok(frame.decode()?)
    }

    /// Arms the session cipher on both directions. Everything sent or
    /// received from here on travels sealed.
    pub fn enable_encryption(&mut self, session_key: &[u8; 16]) {
        self.enc.enable_encryption(SessionCipher::new(session_key));
        self.dec.enable_encryption(SessionCipher::new(session_key));
    }

    pub(crate) fn into_parts(self) -> (TcpStream, FrameEncoder, FrameDecoder) {
        (self.stream, self.enc, self.dec)
    }
}
