use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Largest datagram the UDP transport will send or receive.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// How often a blocked `recv` wakes up to check for `close`.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// UDP transport to a single device.
///
/// Binds a local port the device sends to (the controller's "d2c" port) and
/// sends every datagram to the device's "c2d" address learned during
/// negotiation. Datagrams arriving from any other source are discarded.
pub struct UdpTransport {
    socket: UdpSocket,
    device: SocketAddr,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Bind `local` and target `device` for outbound datagrams.
    pub fn bind(local: SocketAddr, device: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local).map_err(|source| TransportError::Bind {
            addr: local,
            source,
        })?;
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(|source| TransportError::Bind {
                addr: local,
                source,
            })?;

        info!(%local, %device, "udp transport bound");

        Ok(Self {
            socket,
            device,
            closed: AtomicBool::new(false),
        })
    }

    /// The locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The device address outbound datagrams are sent to.
    pub fn device_addr(&self) -> SocketAddr {
        self.device
    }
}

impl Transport for UdpTransport {
    fn send(&self, datagram: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge {
                size: datagram.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }

        loop {
            match self.socket.send_to(datagram, self.device) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn recv(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }

            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if from.ip() != self.device.ip() {
                        debug!(%from, "discarding datagram from unexpected source");
                        continue;
                    }
                    buf.truncate(len);
                    return Ok(Bytes::from(buf));
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(device = %self.device, "udp transport closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn transport_name(&self) -> &'static str {
        "udp"
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.socket.local_addr().ok())
            .field("device", &self.device)
            .field("closed", &self.is_closed())
            .finish()
    }
}
