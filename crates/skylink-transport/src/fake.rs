//! In-memory transport for tests.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Produces device replies for every datagram the controller sends.
pub type Responder = Box<dyn Fn(&[u8]) -> Vec<Bytes> + Send + Sync>;

#[derive(Default)]
struct FakeState {
    sent: Vec<Bytes>,
    inbound: VecDeque<Bytes>,
    failing_sends: usize,
    closed: bool,
}

/// Transport double with scripted send/receive behavior.
///
/// Records every datagram passed to `send`, serves `recv` from a queue that
/// tests fill with [`FakeTransport::push_inbound`], and can optionally reply to
/// each sent datagram through a [`Responder`] (for example to emulate a
/// device that acknowledges reliable frames).
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
    changed: Condvar,
    responder: Option<Responder>,
}

impl FakeTransport {
    /// Create a fake that never replies on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fake that feeds `responder`'s output back as inbound datagrams.
    pub fn with_responder(
        responder: impl Fn(&[u8]) -> Vec<Bytes> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queue a datagram for the next `recv`.
    pub fn push_inbound(&self, datagram: impl Into<Bytes>) {
        let mut state = self.lock();
        state.inbound.push_back(datagram.into());
        self.changed.notify_all();
    }

    /// Make the next `count` sends fail with an I/O error.
    pub fn fail_next_sends(&self, count: usize) {
        self.lock().failing_sends = count;
    }

    /// Every datagram sent so far, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.lock().sent.clone()
    }

    /// Number of datagrams sent so far.
    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Block until at least `count` datagrams were sent or `timeout` elapses.
    ///
    /// Returns whether the count was reached.
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.sent.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for FakeTransport {
    fn send(&self, datagram: &[u8]) -> Result<()> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            if state.failing_sends > 0 {
                state.failing_sends -= 1;
                return Err(TransportError::Io(std::io::Error::other(
                    "scripted send failure",
                )));
            }
            state.sent.push(Bytes::copy_from_slice(datagram));
            self.changed.notify_all();
        }
        trace!(len = datagram.len(), "fake transport sent datagram");

        if let Some(responder) = &self.responder {
            let replies = responder(datagram);
            if !replies.is_empty() {
                let mut state = self.lock();
                state.inbound.extend(replies);
                self.changed.notify_all();
            }
        }
        Ok(())
    }

    fn recv(&self) -> Result<Bytes> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(TransportError::Closed);
            }
            if let Some(datagram) = state.inbound.pop_front() {
                return Ok(datagram);
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn transport_name(&self) -> &'static str {
        "fake"
    }
}

impl std::fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeTransport")
            .field("sent", &state.sent.len())
            .field("inbound", &state.inbound.len())
            .field("closed", &state.closed)
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn records_sent_datagrams() {
        let fake = FakeTransport::new();
        fake.send(b"one").unwrap();
        fake.send(b"two").unwrap();

        let sent = fake.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].as_ref(), b"one");
        assert_eq!(sent[1].as_ref(), b"two");
    }

    #[test]
    fn serves_inbound_in_order() {
        let fake = FakeTransport::new();
        fake.push_inbound(&b"a"[..]);
        fake.push_inbound(&b"b"[..]);

        assert_eq!(fake.recv().unwrap().as_ref(), b"a");
        assert_eq!(fake.recv().unwrap().as_ref(), b"b");
    }

    #[test]
    fn scripted_send_failures() {
        let fake = FakeTransport::new();
        fake.fail_next_sends(1);

        assert!(matches!(fake.send(b"x"), Err(TransportError::Io(_))));
        fake.send(b"y").unwrap();
        assert_eq!(fake.sent_count(), 1);
    }

    #[test]
    fn responder_feeds_inbound_queue() {
        let fake = FakeTransport::with_responder(|datagram| {
            vec![Bytes::from([&b"re:"[..], datagram].concat())]
        });
        fake.send(b"ping").unwrap();

        assert_eq!(fake.recv().unwrap().as_ref(), b"re:ping");
    }

    #[test]
    fn close_wakes_blocked_recv() {
        let fake = Arc::new(FakeTransport::new());
        let reader = {
            let fake = Arc::clone(&fake);
            thread::spawn(move || fake.recv())
        };

        thread::sleep(Duration::from_millis(20));
        fake.close();

        assert!(matches!(reader.join().unwrap(), Err(TransportError::Closed)));
        assert!(matches!(fake.send(b"x"), Err(TransportError::Closed)));
    }

    #[test]
    fn wait_for_sent_times_out() {
        let fake = FakeTransport::new();
        assert!(!fake.wait_for_sent(1, Duration::from_millis(10)));
        fake.send(b"x").unwrap();
        assert!(fake.wait_for_sent(1, Duration::from_millis(10)));
    }
}
