use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use skylink_transport::UdpTransport;
use tracing::info;

use crate::config::ManagerConfig;
use crate::error::Result;
use crate::manager::ChannelManager;
use crate::negotiate::{negotiate, Negotiated, NegotiationConfig, DEFAULT_NEGOTIATION_PORT};

/// Everything needed to bring up a link to one device.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub negotiation: NegotiationConfig,
    /// Device TCP port for the negotiation exchange.
    pub negotiation_port: u16,
    pub manager: ManagerConfig,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            negotiation: NegotiationConfig::default(),
            negotiation_port: DEFAULT_NEGOTIATION_PORT,
            manager: ManagerConfig::default(),
        }
    }
}

/// A negotiated, running device link.
#[derive(Debug)]
pub struct Connection {
    negotiated: Negotiated,
    local_addr: SocketAddr,
    manager: ChannelManager,
}

impl Connection {
    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    /// Local UDP address the device sends to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn manager(&self) -> &ChannelManager {
        &self.manager
    }

    /// Stop all channel workers and close the socket.
    pub fn shutdown(&mut self) {
        self.manager.shutdown();
    }

    pub fn into_manager(self) -> ChannelManager {
        self.manager
    }
}

/// Negotiate with `device`, bind the advertised listen port, and start a
/// [`ChannelManager`] sending to the negotiated device port.
pub fn connect(device: IpAddr, config: &ConnectConfig) -> Result<Connection> {
    config.manager.link.validate()?;

    let negotiated = negotiate(device, config.negotiation_port, &config.negotiation)?;

    let unspecified = match device {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let local = SocketAddr::new(unspecified, negotiated.d2c_port);
    let target = SocketAddr::new(device, negotiated.c2d_port);

    let transport = UdpTransport::bind(local, target)?;
    let local_addr = transport.local_addr()?;
    let manager = ChannelManager::start(Arc::new(transport), config.manager.clone())?;

    info!(%device, %local_addr, c2d_port = negotiated.c2d_port, "device link up");
    Ok(Connection {
        negotiated,
        local_addr,
        manager,
    })
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, UdpSocket};
    use std::thread;
    use std::time::Duration;

    use bytes::Bytes;
    use skylink_frame::{decode_datagram, Frame, FrameType, D2C_EVENT};

    use super::*;
    use crate::error::NetError;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn free_udp_port() -> u16 {
        UdpSocket::bind((LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn negotiation_endpoint(reply: String) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = Vec::new();
            reader.read_until(0, &mut request).unwrap();
            let mut writer = stream;
            writer.write_all(reply.as_bytes()).unwrap();
            writer.write_all(&[0]).unwrap();
        });
        (port, handle)
    }

    #[test]
    fn connect_negotiates_and_exchanges_frames() {
        let device_socket = UdpSocket::bind((LOCALHOST, 0)).unwrap();
        device_socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let c2d_port = device_socket.local_addr().unwrap().port();
        let (negotiation_port, endpoint) =
            negotiation_endpoint(format!("{{\"status\":0,\"c2d_port\":{c2d_port}}}"));

        let d2c_port = free_udp_port();
        let mut config = ConnectConfig {
            negotiation_port,
            ..ConnectConfig::default()
        };
        config.negotiation.listen_port = d2c_port;
        config.negotiation.timeout = Duration::from_secs(2);

        let mut connection = connect(LOCALHOST, &config).unwrap();
        endpoint.join().unwrap();
        assert_eq!(connection.negotiated().c2d_port, c2d_port);
        assert_eq!(connection.local_addr().port(), d2c_port);

        let event = Frame::new(FrameType::DataWithAck, D2C_EVENT, 5, Bytes::from_static(b"evt"))
            .to_bytes()
            .unwrap();
        device_socket.send_to(&event, (LOCALHOST, d2c_port)).unwrap();

        let events = connection.manager().inbound_handle(D2C_EVENT).unwrap();
        assert_eq!(events.recv().unwrap().as_ref(), b"evt");

        let mut buf = [0u8; 2048];
        let (len, _) = device_socket.recv_from(&mut buf).unwrap();
        let ack = decode_datagram(&buf[..len]).unwrap().remove(0);
        assert_eq!(ack.frame_type, FrameType::Ack);
        assert_eq!(ack.channel, D2C_EVENT + 128);
        assert_eq!(ack.payload.as_ref(), b"5");

        connection.shutdown();
    }

    #[test]
    fn refused_negotiation_starts_nothing() {
        let (negotiation_port, endpoint) = negotiation_endpoint("{\"status\":1}".to_string());
        let config = ConnectConfig {
            negotiation_port,
            ..ConnectConfig::default()
        };
        let err = connect(LOCALHOST, &config).unwrap_err();
        endpoint.join().unwrap();
        assert!(matches!(err, NetError::DeviceRefused(1)));
    }
}
