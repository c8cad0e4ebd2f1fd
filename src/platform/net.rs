//! UDP transport over `std::net`.
//!
//! Works on the host and on ESP-IDF. Two sockets are used: a receive socket
//! bound to the server port, where the collection server pushes reports, and
//! a send socket on an ephemeral port. Datagrams coming back from our own
//! send socket (broadcast loopback) are dropped.

use super::{PlatformError, Transport};
use log::{debug, info};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

/// UDP datagram transport.
pub struct UdpTransport {
    listen: SocketAddr,
    destination: SocketAddr,
    rx: Option<UdpSocket>,
    tx: Option<UdpSocket>,
}

impl UdpTransport {
    /// Transport that listens on `listen` and sends to `destination`.
    pub fn new(listen: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            listen,
            destination,
            rx: None,
            tx: None,
        }
    }

    /// Broadcast to `255.255.255.255:port`, listening on the same port.
    pub fn broadcast(port: u16) -> Self {
        Self::new(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into(),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, port).into(),
        )
    }

    /// Local address of the receive socket, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.rx.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn own_port(&self) -> Option<u16> {
        self.tx
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|addr| addr.port())
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> Result<(), PlatformError> {
        if self.rx.is_none() {
            let rx = UdpSocket::bind(self.listen)?;
            rx.set_nonblocking(true)?;
            info!("Listening for server reports on {}", rx.local_addr()?);
            self.rx = Some(rx);
        }
        if self.tx.is_none() {
            let tx = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
            tx.set_broadcast(true)?;
            self.tx = Some(tx);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.rx.is_some() && self.tx.is_some()
    }

    fn send(&mut self, datagram: &[u8]) -> Result<(), PlatformError> {
        let tx = self.tx.as_ref().ok_or(PlatformError::NotOpen)?;
        tx.send_to(datagram, self.destination)?;
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PlatformError> {
        let own_port = self.own_port();
        let rx = self.rx.as_ref().ok_or(PlatformError::NotOpen)?;
        loop {
            match rx.recv_from(buf) {
                Ok((_, from)) if Some(from.port()) == own_port => {
                    debug!("Dropping looped-back datagram from {}", from);
                }
                Ok((len, _)) => return Ok(Some(len)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn loopback(port: u16) -> SocketAddr {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port).into()
    }

    fn recv_within(transport: &mut UdpTransport, buf: &mut [u8]) -> Option<usize> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(len) = transport.try_recv(buf).unwrap() {
                return Some(len);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_send_before_open_fails() {
        let mut transport = UdpTransport::new(loopback(0), loopback(9));
        assert!(!transport.is_open());
        assert!(matches!(transport.send(b"x"), Err(PlatformError::NotOpen)));
        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.try_recv(&mut buf),
            Err(PlatformError::NotOpen)
        ));
    }

    #[test]
    fn test_send_reaches_server() {
        let server = UdpSocket::bind(loopback(0)).unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut transport = UdpTransport::new(loopback(0), server.local_addr().unwrap());
        transport.open().unwrap();
        assert!(transport.is_open());

        transport.send(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello");
    }

    #[test]
    fn test_receive_from_server() {
        let mut transport = UdpTransport::new(loopback(0), loopback(9));
        transport.open().unwrap();
        let listen = transport.local_addr().unwrap();

        let server = UdpSocket::bind(loopback(0)).unwrap();
        server.send_to(b"report", listen).unwrap();

        let mut buf = [0u8; 16];
        let len = recv_within(&mut transport, &mut buf).expect("datagram");
        assert_eq!(&buf[..len], b"report");
    }

    #[test]
    fn test_own_datagrams_dropped() {
        let mut transport = UdpTransport::new(loopback(0), loopback(9));
        transport.open().unwrap();
        let listen = transport.local_addr().unwrap();
        transport.destination = listen;

        transport.send(b"echo").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let mut buf = [0u8; 16];
        assert_eq!(transport.try_recv(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_empty_queue_returns_none() {
        let mut transport = UdpTransport::new(loopback(0), loopback(9));
        transport.open().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(transport.try_recv(&mut buf).unwrap(), None);
    }
}
