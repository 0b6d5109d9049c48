//! Recording transport for hub tests.
//!
//! `MockTransport` is handed to the router; the matching `TransportProbe`
//! stays with the test and shows what was sent and whether the transport was
//! closed.
//!
//! # Example
//!
//! ```rust,ignore
//! use hub_test_utils::MockTransport;
//!
//! let (transport, probe) = MockTransport::new();
//! let conn = router.handle_connect("alice", Box::new(transport)).await?;
//!
//! probe.fail_sends(); // simulate a slow consumer
//! assert!(probe.frames().is_empty());
//! ```

use bytes::Bytes;
use signal_hub::errors::TransportError;
use signal_hub::transport::Transport;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockTransportInner {
    frames: Vec<Bytes>,
    closed: bool,
    close_calls: usize,
    fail_with: Option<TransportError>,
}

/// Transport that records every frame it accepts.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

/// Test-side view of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct TransportProbe {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    /// Create a transport and its probe.
    #[must_use]
    pub fn new() -> (Self, TransportProbe) {
        let inner = Arc::new(Mutex::new(MockTransportInner::default()));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            TransportProbe { inner },
        )
    }
}

impl Transport for MockTransport {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if let Some(err) = inner.fail_with.clone() {
            return Err(err);
        }
        inner.frames.push(frame);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.close_calls += 1;
        if inner.closed {
            return Err(TransportError::Closed);
        }
        inner.closed = true;
        Ok(())
    }
}

impl TransportProbe {
    /// Frames accepted so far, in order.
    pub fn frames(&self) -> Vec<Bytes> {
        self.inner.lock().unwrap().frames.clone()
    }

    /// Frames accepted so far, parsed as JSON.
    ///
    /// Panics if a frame is not valid JSON.
    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.frames()
            .iter()
            .map(|frame| serde_json::from_slice(frame).expect("frame should be JSON"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Number of times `close` was called, including repeats.
    pub fn close_calls(&self) -> usize {
        self.inner.lock().unwrap().close_calls
    }

    /// Make every following send fail with `QueueFull`.
    pub fn fail_sends(&self) {
        self.inner.lock().unwrap().fail_with = Some(TransportError::QueueFull);
    }
}
