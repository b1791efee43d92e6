//! Scripted channels
//!
//! A `MockChannel` answers from a fixed script and records what was sent and how often it
//! was closed, so tests can check the invoker's channel lifecycle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use searchdispatch::{Channel, ChannelError, ConnectionPool, NodeRef, Request, Response};

/// What a mock channel observed
#[derive(Debug, Default)]
pub struct ChannelLog {
    pub sent: Mutex<Vec<Request>>,
    pub closes: AtomicUsize,
    pub receive_timeouts: Mutex<Vec<Duration>>,
}

impl ChannelLog {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

pub struct MockChannel {
    send_result: Result<bool, ChannelError>,
    replies: VecDeque<Result<Vec<Response>, ChannelError>>,
    /// Wait out the caller's timeout before reporting an empty script
    block_when_empty: bool,
    log: Arc<ChannelLog>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            send_result: Ok(true),
            replies: VecDeque::new(),
            block_when_empty: false,
            log: Arc::new(ChannelLog::default()),
        }
    }

    pub fn replying(responses: Vec<Response>) -> Self {
        Self::new().then(Ok(responses))
    }

    pub fn with_send_result(mut self, result: Result<bool, ChannelError>) -> Self {
        self.send_result = result;
        self
    }

    pub fn then(mut self, reply: Result<Vec<Response>, ChannelError>) -> Self {
        self.replies.push_back(reply);
        self
    }

    /// Behave like a silent node: block for the full timeout, then time out
    pub fn silent(mut self) -> Self {
        self.block_when_empty = true;
        self
    }

    pub fn log(&self) -> Arc<ChannelLog> {
        Arc::clone(&self.log)
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MockChannel {
    fn send(&mut self, request: &Request) -> Result<bool, ChannelError> {
        self.log.sent.lock().push(request.clone());
        self.send_result.clone()
    }

    fn receive(&mut self, timeout: Duration, _max: usize) -> Result<Vec<Response>, ChannelError> {
        self.log.receive_timeouts.lock().push(timeout);
        match self.replies.pop_front() {
            Some(reply) => reply,
            None if self.block_when_empty => {
                thread::sleep(timeout);
                Err(ChannelError::Timeout)
            }
            None => Err(ChannelError::Timeout),
        }
    }

    fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_valid(&self) -> bool {
        true
    }
}

type ChannelFactory = Box<dyn Fn(&NodeRef) -> Result<MockChannel, ChannelError> + Send + Sync>;

/// Hands out a fresh channel per request, built by a per-test factory
pub struct MockPool {
    factory: ChannelFactory,
    logs: Mutex<HashMap<u32, Vec<Arc<ChannelLog>>>>,
}

impl MockPool {
    pub fn new(
        factory: impl Fn(&NodeRef) -> Result<MockChannel, ChannelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Channels opened to the node with `distribution_key`
    pub fn channels_opened(&self, distribution_key: u32) -> usize {
        self.logs
            .lock()
            .get(&distribution_key)
            .map_or(0, |logs| logs.len())
    }

    pub fn total_opened(&self) -> usize {
        self.logs.lock().values().map(Vec::len).sum()
    }

    /// True when every channel handed out was closed exactly once
    pub fn all_closed_once(&self) -> bool {
        self.logs
            .lock()
            .values()
            .flatten()
            .all(|log| log.close_count() == 1)
    }
}

impl ConnectionPool for MockPool {
    fn get_channel(&self, node: &NodeRef) -> Result<Box<dyn Channel>, ChannelError> {
        let channel = (self.factory)(node)?;
        self.logs
            .lock()
            .entry(node.key)
            .or_default()
            .push(channel.log());
        Ok(Box::new(channel))
    }
}
