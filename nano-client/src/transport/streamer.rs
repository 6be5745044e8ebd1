use std::io;

use tokio::net::UdpSocket;

use nano_protocol::packer;
use nano_protocol::packet::Message;

use crate::SessionError;

/// Connected datagram endpoint for the media leg. One message per
/// datagram in both directions.
pub struct StreamerTransport {
    socket: UdpSocket,
}

impl StreamerTransport {
    pub async fn connect(address: &str, port: u16) -> Result<Self, SessionError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((address, port)).await?;
        Ok(Self { socket })
    }

    pub async fn send(&self, msg: &Message) -> Result<(), SessionError> {
        let data = packer::pack(msg)?;
        self.socket.send(&data).await?;
        Ok(())
    }

    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }
}
