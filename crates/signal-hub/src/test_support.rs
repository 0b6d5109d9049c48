//! In-crate transport double for unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::errors::TransportError;
use crate::transport::Transport;

use bytes::Bytes;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<Bytes>,
    closed: bool,
    close_calls: usize,
    fail_sends: bool,
    fail_close: bool,
}

/// Transport that records every frame it is given.
#[derive(Debug)]
pub struct RecordingTransport {
    shared: Arc<Mutex<Recorded>>,
}

/// Test-side view of a [`RecordingTransport`].
#[derive(Debug, Clone)]
pub struct TransportProbe {
    shared: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    pub fn new() -> (Self, TransportProbe) {
        let shared = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            TransportProbe { shared },
        )
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        let mut recorded = self.shared.lock().unwrap();
        if recorded.closed {
            return Err(TransportError::Closed);
        }
        if recorded.fail_sends {
            return Err(TransportError::QueueFull);
        }
        recorded.frames.push(frame);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut recorded = self.shared.lock().unwrap();
        recorded.close_calls += 1;
        if recorded.fail_close {
            return Err(TransportError::Encode("close frame".to_string()));
        }
        if recorded.closed {
            return Err(TransportError::Closed);
        }
        recorded.closed = true;
        Ok(())
    }
}

impl TransportProbe {
    pub fn frames(&self) -> Vec<Bytes> {
        self.shared.lock().unwrap().frames.clone()
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.frames()
            .iter()
            .map(|f| serde_json::from_slice(f).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().unwrap().closed
    }

    pub fn close_calls(&self) -> usize {
        self.shared.lock().unwrap().close_calls
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.shared.lock().unwrap().fail_sends = fail;
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.shared.lock().unwrap().fail_close = fail;
    }
}
