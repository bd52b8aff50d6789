//! UDP datagram channel to the headset.
//!
//! One socket serves both the foreground control exchange and the
//! acquisition thread; [`BoardSocket::try_clone`] hands the reader its own
//! handle to the same underlying socket. The device protocol is half-duplex,
//! so control replies and sample data never mingle on the wire.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// Receive timeout applied on open and restored after the stop drain.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connected UDP socket with a settable receive timeout.
#[derive(Debug)]
pub struct BoardSocket {
    socket: UdpSocket,
}

impl BoardSocket {
    /// Open a socket connected to the device address.
    pub fn open(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        // A 250 Hz transaction stream fills default kernel buffers quickly.
        let _ = socket.set_recv_buffer_size(1024 * 1024);
        socket.set_read_timeout(Some(DEFAULT_TIMEOUT))?;
        let socket: UdpSocket = socket.into();
        socket.connect(addr)?;
        Ok(BoardSocket { socket })
    }

    /// Send one datagram to the device.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    /// Receive one datagram, truncated to `buf` if larger.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }

    /// Change the receive timeout.
    pub fn set_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }

    /// Clone the handle for the acquisition thread.
    ///
    /// Both handles share the same underlying OS socket.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(BoardSocket {
            socket: self.socket.try_clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn sends_and_receives_against_a_loopback_peer() {
        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let socket = BoardSocket::open(peer.local_addr().unwrap()).unwrap();

        socket.send(b"d").unwrap();
        let mut buf = [0u8; 16];
        let (n, from) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"d");

        peer.send_to(b"A", from).unwrap();
        let n = socket.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"A");
    }

    #[test]
    fn recv_times_out_without_data() {
        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let socket = BoardSocket::open(peer.local_addr().unwrap()).unwrap();
        socket.set_timeout(Duration::from_millis(50)).unwrap();

        let mut buf = [0u8; 16];
        let err = socket.recv(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
    }
}
