use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use nano_protocol::packer;
use nano_protocol::packet::Message;

use crate::SessionError;

const RECV_BUFFER_SIZE: usize = 4096;

/// Reliable control connection. Sends encode and write immediately; the
/// receive half is driven by the session's receive task.
pub struct ControlTransport {
    writer: Mutex<OwnedWriteHalf>,
}

impl ControlTransport {
    pub async fn connect(address: &str, port: u16) -> Result<(Self, ControlReceiver), SessionError> {
        let stream = TcpStream::connect((address, port)).await?;
        let (reader, writer) = stream.into_split();
        Ok((
            Self {
                writer: Mutex::new(writer),
            },
            ControlReceiver {
                reader,
                pending: BytesMut::new(),
            },
        ))
    }

    pub async fn send(&self, msg: &Message) -> Result<(), SessionError> {
        let data = packer::pack_tcp(std::slice::from_ref(msg))?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }
}

/// Reads the stream in 4 KiB chunks and yields complete length-framed
/// messages. The console writes whole messages, but a frame split across
/// reads is buffered until the remainder arrives.
pub struct ControlReceiver {
    reader: OwnedReadHalf,
    pending: BytesMut,
}

impl ControlReceiver {
    pub async fn next_frame(&mut self) -> Result<Bytes, SessionError> {
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(frame);
            }
            let mut chunk = [0u8; RECV_BUFFER_SIZE];
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                return Err(SessionError::TransportClosed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "control connection closed by console",
                )));
            }
            self.pending.extend_from_slice(&chunk[..read]);
        }
    }

    fn take_frame(&mut self) -> Option<Bytes> {
        if self.pending.len() < 4 {
            return None;
        }
        let len = u32::from_le_bytes([
            self.pending[0],
            self.pending[1],
            self.pending[2],
            self.pending[3],
        ]) as usize;
        if self.pending.len() - 4 < len {
            return None;
        }
        self.pending.advance(4);
        Some(self.pending.split_to(len).freeze())
    }
}
