use bytes::Bytes;

use crate::error::Result;

/// A datagram transport shared by every channel of a link.
///
/// All outbound send loops call [`Transport::send`] concurrently while a
/// single receive loop blocks in [`Transport::recv`], so implementations must
/// be safe for concurrent callers. Writes are not serialized above this layer.
pub trait Transport: Send + Sync {
    /// Send one datagram to the device.
    fn send(&self, datagram: &[u8]) -> Result<()>;

    /// Block until the next datagram arrives.
    ///
    /// Returns `Err(TransportError::Closed)` once [`Transport::close`] has been
    /// called; the caller should stop its receive loop.
    fn recv(&self) -> Result<Bytes>;

    /// Close the transport. Pending and future `recv` calls return `Closed`.
    fn close(&self);

    /// Whether [`Transport::close`] has been called.
    fn is_closed(&self) -> bool;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}
