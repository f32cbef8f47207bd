//! Transport layer abstraction for sync passes.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tally_engine::{Identity, SyncRequest, SyncResponse};

/// A sync transport carries one request/response exchange to the server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Sends a batch and returns the server's answer.
    async fn send(&self, request: &SyncRequest, identity: &Identity) -> SyncResult<SyncResponse>;
}

/// A scripted reply for [`MockTransport`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(SyncResponse),
    /// Fail with a retryable transport error.
    Fail(String),
}

/// A mock transport for testing.
///
/// Replies are consumed in order; once the script is exhausted every request
/// gets an empty successful response echoing the request watermark.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<(SyncRequest, Identity)>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues the next reply.
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<(SyncRequest, Identity)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn send(&self, request: &SyncRequest, identity: &Identity) -> SyncResult<SyncResponse> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        self.requests
            .lock()
            .push((request.clone(), identity.clone()));

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(message)) => Err(SyncError::transport_retryable(message)),
            None => Ok(SyncResponse::ok(Vec::new(), request.last_sync_timestamp)),
        }
    }
}
