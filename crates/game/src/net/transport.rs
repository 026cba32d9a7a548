use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::protocol::MAX_PACKET_SIZE;

pub trait Transport {
    fn send(&mut self, bytes: &[u8], to: SocketAddr) -> io::Result<()>;

    /// Never blocks. `Ok(None)` means nothing is waiting right now.
    fn try_receive(&mut self) -> io::Result<Option<(Vec<u8>, SocketAddr)>>;
}

pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: Box<[u8]>,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            // Room for one oversized datagram so it is seen whole and rejected
            // by the decoder rather than silently cut by the OS.
            recv_buffer: vec![0u8; MAX_PACKET_SIZE * 2].into_boxed_slice(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, bytes: &[u8], to: SocketAddr) -> io::Result<()> {
        match self.socket.send_to(bytes, to) {
            Ok(sent) if sent == bytes.len() => Ok(()),
            Ok(sent) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, bytes.len()),
            )),
            // A full send buffer loses this datagram the way the network would.
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn try_receive(&mut self) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((size, addr)) => Ok(Some((self.recv_buffer[..size].to_vec(), addr))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
