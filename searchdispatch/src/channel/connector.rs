// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! TCP connector

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::codec::{codec_for, WireCodec};
use super::stream::StreamChannel;
use super::{Channel, ChannelError, ConnectionPool};
use crate::node::NodeRef;
use crate::protocol::ProtocolKind;

/// Opens a fresh stream channel per request; nothing is kept between requests.
/// Each channel gets its own id, and legacy replies carrying another id are rejected.
pub struct TcpConnector {
    codec: Arc<dyn WireCodec>,
    connect_timeout: Duration,
    next_channel_id: AtomicU32,
}

impl TcpConnector {
    pub fn new(protocol: ProtocolKind, connect_timeout: Duration) -> Self {
        Self {
            codec: codec_for(protocol),
            connect_timeout,
            next_channel_id: AtomicU32::new(1),
        }
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.codec.protocol()
    }
}

impl ConnectionPool for TcpConnector {
    fn get_channel(&self, node: &NodeRef) -> Result<Box<dyn Channel>, ChannelError> {
        let channel_id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let channel = StreamChannel::connect(
            node,
            channel_id,
            Arc::clone(&self.codec),
            self.connect_timeout,
        )?;
        Ok(Box::new(channel))
    }
}
