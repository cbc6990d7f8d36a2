//! The per-connection actor pair.
//!
//! After the world handshake a connection splits into a reader task (socket →
//! decoder → frame mailbox) and a writer task (outbound mailbox → encoder →
//! socket). The writer owns the encoder and its cipher, so packets are
//! sealed and written strictly in submission order; the reader owns the
//! decoder. Dropping either end of a mailbox tears the pair down.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use nexus_protocol::{FrameDecoder, FrameEncoder, Message, Opcode, PacketFrame};

use crate::packet_io::PacketIo;

const READ_BUF_SIZE: usize = 4096;

/// One queued item on the writer mailbox.
pub enum OutboundFrame {
    Frame { opcode: Opcode, payload: Vec<u8> },
    Close,
}

impl OutboundFrame {
    /// Unwraps a frame, dropping close markers. Test helper.
    pub fn into_frame(self) -> Option<(Opcode, Vec<u8>)> {
        match self {
            OutboundFrame::Frame { opcode, payload } => Some((opcode, payload)),
            OutboundFrame::Close => None,
        }
    }
}

/// Cheap cloneable handle used by zone and world actors to push packets to
/// one client.
#[derive(Clone)]
pub struct ConnectionHandle {
    peer: SocketAddr,
    outbound: flume::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a message. Returns `false` once the connection is gone;
    /// callers treat that as a disconnect signal, not an error.
    pub fn send<M: Message>(&self, msg: &M) -> bool {
        self.send_raw(M::OPCODE, msg.to_payload())
    }

    pub fn send_raw(&self, opcode: Opcode, payload: Vec<u8>) -> bool {
        self.outbound
            .send(OutboundFrame::Frame { opcode, payload })
            .is_ok()
    }

    /// Asks the writer to flush and close the socket.
    pub fn close(&self) {
        let _ = self.outbound.send(OutboundFrame::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_disconnected()
    }

    /// An in-memory handle with no socket behind it; queued frames land on
    /// the returned receiver. Used by tests and diagnostic tooling.
    pub fn detached() -> (Self, flume::Receiver<OutboundFrame>) {
        let (outbound_tx, outbound_rx) = flume::unbounded();
        (
            Self {
                peer: SocketAddr::from(([0, 0, 0, 0], 0)),
                outbound: outbound_tx,
            },
            outbound_rx,
        )
    }
}

/// A world connection that has passed the session-key handshake, ready to be
/// claimed by the session layer.
pub struct NewWorldClient {
    pub account_id: u64,
    pub peer: SocketAddr,
    pub handle: ConnectionHandle,
    /// Inbound frames, already unsealed. Disconnection closes the channel.
    pub frames: flume::Receiver<PacketFrame>,
    reader_task: JoinHandle<()>,
}

impl Drop for NewWorldClient {
    fn drop(&mut self) {
        // The writer is not held here: it drains its queue (any farewell
        // packets included) and exits on a close marker or once every
        // sender is gone.
        self.reader_task.abort();
    }
}

/// Splits a handshaken connection into its actor pair.
pub(crate) fn spawn_connection(io: PacketIo, peer: SocketAddr, account_id: u64) -> NewWorldClient {
    let (stream, enc, dec) = io.into_parts();
    let (read_half, write_half) = stream.into_split();

    let (frames_tx, frames_rx) = flume::unbounded();
    let (outbound_tx, outbound_rx) = flume::unbounded();

    let reader_task = tokio::spawn(run_reader(read_half, dec, frames_tx));
    tokio::spawn(run_writer(write_half, enc, outbound_rx));

    NewWorldClient {
        account_id,
        peer,
        handle: ConnectionHandle {
            peer,
            outbound: outbound_tx,
        },
        frames: frames_rx,
        reader_task,
    }
}

async fn run_reader(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    mut dec: FrameDecoder,
    frames_tx: flume::Sender<PacketFrame>,
) {
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        loop {
            match dec.try_next_frame() {
                Ok(Some(frame)) => {
                    if frames_tx.send(frame).is_err() {
                        // Session side hung up.
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Framing is unrecoverable once the stream desyncs.
                    warn!("dropping connection on frame error: {e}");
                    return;
                }
            }
        }
        match read_half.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => dec.queue_bytes(&buf[..n]),
            Err(e) => {
                debug!("read error: {e}");
                return;
            }
        }
    }
}

async fn run_writer(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut enc: FrameEncoder,
    outbound_rx: flume::Receiver<OutboundFrame>,
) {
    while let Ok(msg) = outbound_rx.recv_async().await {
        match msg {
            OutboundFrame::Frame { opcode, payload } => {
                if let Err(e) = enc.append_frame(opcode, &payload) {
                    warn!(%opcode, "failed to encode outbound frame: {e}");
                    continue;
                }
                let bytes = enc.take();
                if let Err(e) = write_half.write_all(&bytes).await {
                    debug!("write error: {e}");
                    return;
                }
            }
            OutboundFrame::Close => {
                let _ = write_half.shutdown().await;
                return;
            }
        }
    }
}
