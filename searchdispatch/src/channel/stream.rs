// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Stream-backed channel
//!
//! A reader thread owns the receiving half of the connection. It decodes frames and passes
//! each response through a single-slot queue to the caller blocked in
//! [`Channel::receive`]. End of stream or an undecodable frame invalidates the channel.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::codec::WireCodec;
use super::{Channel, ChannelError, Request, Response};
use crate::node::NodeRef;
use crate::protocol::MAX_FRAME_SIZE;

pub struct StreamChannel {
    name: String,
    channel_id: u32,
    codec: Arc<dyn WireCodec>,
    writer: Option<TcpStream>,
    responses: Option<Receiver<Response>>,
    valid: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl StreamChannel {
    /// Connects to `node` and starts the reader thread
    pub fn connect(
        node: &NodeRef,
        channel_id: u32,
        codec: Arc<dyn WireCodec>,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let address = node
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ChannelError::Io(format!("No address for {}", node)))?;
        let stream = TcpStream::connect_timeout(&address, timeout)?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, node.to_string(), channel_id, codec)
    }

    pub fn from_stream(
        stream: TcpStream,
        name: String,
        channel_id: u32,
        codec: Arc<dyn WireCodec>,
    ) -> Result<Self, ChannelError> {
        let read_half = stream.try_clone()?;
        let (sender, receiver) = bounded(1);
        let valid = Arc::new(AtomicBool::new(true));

        let reader_codec = Arc::clone(&codec);
        let reader_valid = Arc::clone(&valid);
        let reader_name = name.clone();
        let reader = std::thread::Builder::new()
            .name(format!("searchdispatch-reader-{}", channel_id))
            .spawn(move || {
                read_loop(
                    read_half,
                    channel_id,
                    reader_codec,
                    sender,
                    reader_valid,
                    reader_name,
                )
            })?;

        log::trace!("Opened channel {} to {}", channel_id, name);
        Ok(Self {
            name,
            channel_id,
            codec,
            writer: Some(stream),
            responses: Some(receiver),
            valid,
            reader: Some(reader),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Reads one frame body; `None` on a clean end of stream
fn read_frame(stream: &mut impl Read) -> std::io::Result<Option<Vec<u8>>> {
    let mut length = [0u8; 4];
    match stream.read_exact(&mut length) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let length = u32::from_be_bytes(length) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds {}", length, MAX_FRAME_SIZE),
        ));
    }
    let mut frame = vec![0u8; length];
    stream.read_exact(&mut frame)?;
    Ok(Some(frame))
}

fn read_loop(
    mut stream: TcpStream,
    channel_id: u32,
    codec: Arc<dyn WireCodec>,
    sender: Sender<Response>,
    valid: Arc<AtomicBool>,
    name: String,
) {
    loop {
        match read_frame(&mut stream) {
            Ok(Some(frame)) => match codec.decode(channel_id, &frame) {
                Ok(responses) => {
                    for response in responses {
                        log::trace!("{} received {}", name, response.kind());
                        if sender.send(response).is_err() {
                            valid.store(false, Ordering::Release);
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Dropping channel to {}: {}", name, e);
                    break;
                }
            },
            Ok(None) => {
                log::trace!("Connection to {} closed by peer", name);
                break;
            }
            Err(e) => {
                log::debug!("Read from {} failed: {}", name, e);
                break;
            }
        }
    }
    valid.store(false, Ordering::Release);
}

impl Channel for StreamChannel {
    fn send(&mut self, request: &Request) -> Result<bool, ChannelError> {
        if !self.is_valid() {
            return Err(ChannelError::Invalid(self.name.clone()));
        }
        let frame = self.codec.encode(self.channel_id, request)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ChannelError::IllegalState("channel is closed".to_string()))?;

        match writer.write_all(&frame).and_then(|_| writer.flush()) {
            Ok(()) => {
                log::trace!("Sent {} to {}", request.kind(), self.name);
                Ok(true)
            }
            Err(e) => {
                log::debug!("Could not send to {}: {}", self.name, e);
                self.valid.store(false, Ordering::Release);
                Ok(false)
            }
        }
    }

    fn receive(&mut self, timeout: Duration, max: usize) -> Result<Vec<Response>, ChannelError> {
        let responses = self
            .responses
            .as_ref()
            .ok_or_else(|| ChannelError::IllegalState("channel is closed".to_string()))?;
        if max == 0 {
            return Ok(Vec::new());
        }

        let first = match responses.recv_timeout(timeout) {
            Ok(response) => response,
            Err(RecvTimeoutError::Timeout) => return Err(ChannelError::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ChannelError::Invalid(self.name.clone()))
            }
        };

        let mut received = vec![first];
        while received.len() < max {
            match responses.try_recv() {
                Ok(response) => received.push(response),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        Ok(received)
    }

    fn close(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        self.valid.store(false, Ordering::Release);
        let _ = writer.shutdown(Shutdown::Both);
        // Unblocks a reader waiting on a full slot
        self.responses = None;
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::warn!("Reader thread for {} panicked", self.name);
            }
        }
        log::trace!("Closed channel {} to {}", self.channel_id, self.name);
    }

    fn is_valid(&self) -> bool {
        self.writer.is_some() && self.valid.load(Ordering::Acquire)
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::codec::LegacyCodec;
    use crate::protocol::legacy::{Packet, QueryPacket, QueryResultPacket};
    use crate::query::Query;
    use std::net::TcpListener;

    fn result_packet() -> QueryResultPacket {
        QueryResultPacket {
            offset: 0,
            total_hits: 0,
            max_rank: 0.0,
            coverage: None,
            documents: vec![],
        }
    }

    #[test]
    fn test_request_and_response_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let frame = read_frame(&mut stream).unwrap().unwrap();
            let (channel_id, packet) = Packet::decode(&frame).unwrap();
            assert!(matches!(packet, Packet::Query(_)));
            let reply = Packet::QueryResult(result_packet()).encode(channel_id).unwrap();
            stream.write_all(&reply).unwrap();
        });

        let node = NodeRef::new(0, "127.0.0.1", address.port(), 0);
        let mut channel =
            StreamChannel::connect(&node, 5, Arc::new(LegacyCodec), Duration::from_secs(1))
                .unwrap();
        let request = Request::Query(QueryPacket::from_query(&Query::new("a")));
        assert!(channel.send(&request).unwrap());

        let responses = channel.receive(Duration::from_secs(5), 1).unwrap();
        assert_eq!(responses, vec![Response::QueryResult(result_packet())]);
        server.join().unwrap();

        channel.close();
        channel.close();
        assert!(!channel.is_valid());
        assert!(matches!(
            channel.receive(Duration::from_millis(1), 1),
            Err(ChannelError::IllegalState(_))
        ));
    }

    #[test]
    fn test_reply_with_foreign_channel_id_is_not_accepted() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let frame = read_frame(&mut stream).unwrap().unwrap();
            let (channel_id, _) = Packet::decode(&frame).unwrap();
            let reply = Packet::QueryResult(result_packet())
                .encode(channel_id + 1)
                .unwrap();
            stream.write_all(&reply).unwrap();
        });

        let node = NodeRef::new(0, "127.0.0.1", address.port(), 0);
        let mut channel =
            StreamChannel::connect(&node, 9, Arc::new(LegacyCodec), Duration::from_secs(1))
                .unwrap();
        let request = Request::Query(QueryPacket::from_query(&Query::new("a")));
        assert!(channel.send(&request).unwrap());

        let responses = channel.receive(Duration::from_secs(5), 1).unwrap();
        assert_eq!(
            responses,
            vec![Response::Unexpected("QueryResultPacket for channel 10".into())]
        );
        server.join().unwrap();
    }

    #[test]
    fn test_peer_close_invalidates() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let node = NodeRef::new(0, "127.0.0.1", address.port(), 0);
        let mut channel =
            StreamChannel::connect(&node, 1, Arc::new(LegacyCodec), Duration::from_secs(1))
                .unwrap();
        server.join().unwrap();

        assert!(matches!(
            channel.receive(Duration::from_secs(5), 1),
            Err(ChannelError::Invalid(_))
        ));
        assert!(!channel.is_valid());
    }

    #[test]
    fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let node = NodeRef::new(0, "127.0.0.1", address.port(), 0);
        let mut channel =
            StreamChannel::connect(&node, 1, Arc::new(LegacyCodec), Duration::from_secs(1))
                .unwrap();
        let _accepted = listener.accept().unwrap();

        let started = std::time::Instant::now();
        assert_eq!(
            channel.receive(Duration::from_millis(50), 1),
            Err(ChannelError::Timeout)
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
