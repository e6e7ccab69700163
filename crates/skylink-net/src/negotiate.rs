use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NetError, Result};

/// TCP port the device listens on for the negotiation exchange.
pub const DEFAULT_NEGOTIATION_PORT: u16 = 44444;
/// Local UDP port advertised to the device as `d2c_port`.
pub const DEFAULT_LISTEN_PORT: u16 = 43210;

const MAX_CONTROLLER_TYPE_LEN: usize = 32;
const MAX_CONTROLLER_NAME_LEN: usize = 128;
const TERMINATOR: u8 = 0;

/// Request sent by the controller, NUL-terminated on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NegotiationRequest {
    /// Controller category, `computer` for a host controller.
    pub controller_type: String,
    /// Human-readable controller name.
    pub controller_name: String,
    /// UDP port the device must send to.
    pub d2c_port: u16,
}

/// Device answer to a [`NegotiationRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NegotiationResponse {
    /// Zero means accepted; anything else is a refusal.
    pub status: i32,
    /// UDP port the controller must send to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c2d_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arstream_fragment_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arstream_fragment_maximum_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c2d_update_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c2d_user_port: Option<u16>,
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Device address the exchange ran against.
    pub device: IpAddr,
    /// Port outbound traffic must target.
    pub c2d_port: u16,
    /// Local port the device will send to.
    pub d2c_port: u16,
    /// Full response, including optional device parameters.
    pub response: NegotiationResponse,
}

/// Controller identity and limits for the negotiation exchange.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    pub controller_type: String,
    pub controller_name: String,
    /// Advertised as `d2c_port`.
    pub listen_port: u16,
    /// Bound on connecting, and on the whole request/response exchange.
    pub timeout: Duration,
    /// Largest response accepted before the terminator.
    pub max_response_size: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            controller_type: "computer".to_string(),
            controller_name: "skylink".to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            timeout: Duration::from_secs(5),
            max_response_size: 4 * 1024,
        }
    }
}

impl NegotiationConfig {
    pub fn validate(&self) -> Result<()> {
        validate_text("controller_type", &self.controller_type, MAX_CONTROLLER_TYPE_LEN)?;
        validate_text("controller_name", &self.controller_name, MAX_CONTROLLER_NAME_LEN)?;
        if self.timeout.is_zero() {
            return Err(NetError::NegotiationFailed(
                "timeout must be non-zero".to_string(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(NetError::NegotiationFailed(
                "max_response_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    fn request(&self) -> NegotiationRequest {
        NegotiationRequest {
            controller_type: self.controller_type.clone(),
            controller_name: self.controller_name.clone(),
            d2c_port: self.listen_port,
        }
    }
}

/// Run the negotiation exchange against `device:negotiation_port` over TCP.
///
/// Returns the port the controller must send to. Fails on connect errors,
/// timeouts, unparseable responses, and on any non-zero device status.
pub fn negotiate(
    device: IpAddr,
    negotiation_port: u16,
    config: &NegotiationConfig,
) -> Result<Negotiated> {
    config.validate()?;

    let addr = SocketAddr::new(device, negotiation_port);
    debug!(%addr, "connecting for negotiation");
    let mut stream = TcpStream::connect_timeout(&addr, config.timeout)
        .map_err(|err| map_io(err, config.timeout))?;
    stream.set_read_timeout(Some(config.timeout))?;
    stream.set_write_timeout(Some(config.timeout))?;

    let response = negotiate_stream(&mut stream, config)?;
    let c2d_port = match response.c2d_port {
        Some(port) if port != 0 => port,
        _ => {
            return Err(NetError::NegotiationFailed(
                "device response carries no c2d_port".to_string(),
            ))
        }
    };

    info!(%addr, c2d_port, d2c_port = config.listen_port, "negotiated device link");
    Ok(Negotiated {
        device,
        c2d_port,
        d2c_port: config.listen_port,
        response,
    })
}

/// Run the request/response exchange over an already-open stream.
///
/// Reads are expected to time out on their own (e.g. via
/// [`TcpStream::set_read_timeout`]); the overall exchange is additionally
/// bounded by `config.timeout`.
pub fn negotiate_stream<S: Read + Write>(
    stream: &mut S,
    config: &NegotiationConfig,
) -> Result<NegotiationResponse> {
    let mut request = serde_json::to_vec(&config.request())?;
    request.push(TERMINATOR);
    stream
        .write_all(&request)
        .and_then(|()| stream.flush())
        .map_err(|err| map_io(err, config.timeout))?;

    let deadline = Instant::now() + config.timeout;
    let raw = read_response(stream, deadline, config.timeout, config.max_response_size)?;
    let response: NegotiationResponse = serde_json::from_slice(&raw)?;

    if response.status != 0 {
        return Err(NetError::DeviceRefused(response.status));
    }
    Ok(response)
}

/// Read up to the NUL terminator; EOF also ends a non-empty response.
fn read_response<R: Read>(
    reader: &mut R,
    deadline: Instant,
    timeout: Duration,
    max_response_size: usize,
) -> Result<Vec<u8>> {
    let mut response = Vec::new();
    let mut chunk = [0u8; 512];

    loop {
        if Instant::now() >= deadline {
            return Err(NetError::Timeout(timeout));
        }

        let read = match reader.read(&mut chunk) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(err) => return Err(NetError::Io(err)),
        };

        if read == 0 {
            if response.is_empty() {
                return Err(NetError::NegotiationFailed(
                    "device closed the connection without a response".to_string(),
                ));
            }
            return Ok(response);
        }

        let received = &chunk[..read];
        let (body, terminated) = match received.iter().position(|&b| b == TERMINATOR) {
            Some(end) => (&received[..end], true),
            None => (received, false),
        };
        if response.len() + body.len() > max_response_size {
            return Err(NetError::NegotiationFailed(format!(
                "negotiation response exceeds {max_response_size} bytes"
            )));
        }
        response.extend_from_slice(body);

        if terminated {
            return Ok(response);
        }
    }
}

fn validate_text(field: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() || value.len() > max_len {
        return Err(NetError::NegotiationFailed(format!(
            "invalid {field} length: {}",
            value.len()
        )));
    }
    if value.contains('\0') {
        return Err(NetError::NegotiationFailed(format!(
            "{field} must not contain NUL"
        )));
    }
    Ok(())
}

fn map_io(err: std::io::Error, timeout: Duration) -> NetError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => NetError::Timeout(timeout),
        _ => NetError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufRead;
    use std::io::BufReader;
    use std::net::{Ipv4Addr, TcpListener};
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Accept one connection, capture the request, answer with `reply`.
    fn device(reply: &'static [u8]) -> (u16, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = Vec::new();
            reader.read_until(0, &mut request).unwrap();
            let mut writer = stream;
            let _ = writer.write_all(reply);
            request
        });
        (port, handle)
    }

    fn quick() -> NegotiationConfig {
        NegotiationConfig {
            timeout: Duration::from_millis(500),
            ..NegotiationConfig::default()
        }
    }

    #[test]
    fn successful_negotiation_returns_device_port() {
        let (port, device) = device(b"{\"status\":0,\"c2d_port\":54321}\0");
        let negotiated = negotiate(LOCALHOST, port, &quick()).unwrap();

        assert_eq!(negotiated.c2d_port, 54321);
        assert_eq!(negotiated.d2c_port, DEFAULT_LISTEN_PORT);
        assert_eq!(negotiated.device, LOCALHOST);

        let request = device.join().unwrap();
        assert_eq!(request.last(), Some(&0));
        let parsed: NegotiationRequest =
            serde_json::from_slice(&request[..request.len() - 1]).unwrap();
        assert_eq!(parsed.controller_type, "computer");
        assert_eq!(parsed.controller_name, "skylink");
        assert_eq!(parsed.d2c_port, DEFAULT_LISTEN_PORT);
    }

    #[test]
    fn optional_device_parameters_are_parsed() {
        let (port, device) = device(
            b"{\"status\":0,\"c2d_port\":54321,\"arstream_fragment_size\":65000,\
              \"arstream_fragment_maximum_number\":4,\"c2d_update_port\":51,\
              \"c2d_user_port\":21,\"unexpected\":true}\0",
        );
        let negotiated = negotiate(LOCALHOST, port, &quick()).unwrap();
        device.join().unwrap();

        let response = negotiated.response;
        assert_eq!(response.arstream_fragment_size, Some(65000));
        assert_eq!(response.arstream_fragment_maximum_number, Some(4));
        assert_eq!(response.c2d_update_port, Some(51));
        assert_eq!(response.c2d_user_port, Some(21));
    }

    #[test]
    fn response_ended_by_eof_is_accepted() {
        let (port, device) = device(b"{\"status\":0,\"c2d_port\":4000}");
        let negotiated = negotiate(LOCALHOST, port, &quick()).unwrap();
        device.join().unwrap();
        assert_eq!(negotiated.c2d_port, 4000);
    }

    #[test]
    fn non_zero_status_is_a_refusal() {
        let (port, device) = device(b"{\"status\":-1}\0");
        let err = negotiate(LOCALHOST, port, &quick()).unwrap_err();
        device.join().unwrap();
        assert!(matches!(err, NetError::DeviceRefused(-1)));
    }

    #[test]
    fn accepted_without_port_fails() {
        let (port, device) = device(b"{\"status\":0}\0");
        let err = negotiate(LOCALHOST, port, &quick()).unwrap_err();
        device.join().unwrap();
        assert!(matches!(err, NetError::NegotiationFailed(_)));
    }

    #[test]
    fn unparseable_response_fails() {
        let (port, device) = device(b"not json\0");
        let err = negotiate(LOCALHOST, port, &quick()).unwrap_err();
        device.join().unwrap();
        assert!(matches!(err, NetError::Json(_)));
    }

    #[test]
    fn empty_response_fails() {
        let (port, device) = device(b"");
        let err = negotiate(LOCALHOST, port, &quick()).unwrap_err();
        device.join().unwrap();
        assert!(matches!(err, NetError::NegotiationFailed(_)));
    }

    #[test]
    fn oversized_response_fails() {
        let (port, device) = device(&[b' '; 8192]);
        let config = NegotiationConfig {
            max_response_size: 1024,
            ..quick()
        };
        let err = negotiate(LOCALHOST, port, &config).unwrap_err();
        let _ = device.join();
        assert!(matches!(err, NetError::NegotiationFailed(_)));
    }

    #[test]
    fn silent_device_times_out() {
        let listener = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let (release, hold) = mpsc::channel::<()>();
        let device = thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            let _ = hold.recv();
        });

        let config = NegotiationConfig {
            timeout: Duration::from_millis(150),
            ..NegotiationConfig::default()
        };
        let err = negotiate(LOCALHOST, port, &config).unwrap_err();
        release.send(()).unwrap();
        device.join().unwrap();
        assert!(matches!(err, NetError::Timeout(_)));
    }

    #[test]
    fn unreachable_endpoint_fails() {
        let port = {
            let listener = TcpListener::bind((LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(negotiate(LOCALHOST, port, &quick()).is_err());
    }

    #[test]
    fn invalid_controller_identity_is_rejected() {
        let config = NegotiationConfig {
            controller_name: "bad\0name".to_string(),
            ..quick()
        };
        assert!(matches!(
            config.validate(),
            Err(NetError::NegotiationFailed(_))
        ));

        let config = NegotiationConfig {
            controller_type: String::new(),
            ..quick()
        };
        assert!(config.validate().is_err());
    }
}
