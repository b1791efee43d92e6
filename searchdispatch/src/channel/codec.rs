// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Request and response codecs for the stream channel

use std::sync::Arc;

use super::{Request, Response};
use crate::protocol::error::{CodecError, CodecResult};
use crate::protocol::legacy::{GetDocsumsPacket, Packet};
use crate::protocol::rpc::RpcMessage;
use crate::protocol::ProtocolKind;

/// Turns requests into frames and received frames into responses
pub trait WireCodec: Send + Sync {
    fn protocol(&self) -> ProtocolKind;

    /// Complete frame including the length prefix
    fn encode(&self, channel_id: u32, request: &Request) -> CodecResult<Vec<u8>>;

    /// Decodes one frame body without its length prefix, received on `channel_id`
    fn decode(&self, channel_id: u32, frame: &[u8]) -> CodecResult<Vec<Response>>;
}

pub fn codec_for(protocol: ProtocolKind) -> Arc<dyn WireCodec> {
    match protocol {
        ProtocolKind::Legacy => Arc::new(LegacyCodec),
        ProtocolKind::Rpc => Arc::new(RpcCodec),
    }
}

fn wrong_protocol(request: &Request, protocol: ProtocolKind) -> CodecError {
    CodecError::Malformed(format!("{} on a {} channel", request.kind(), protocol))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

impl WireCodec for LegacyCodec {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Legacy
    }

    fn encode(&self, channel_id: u32, request: &Request) -> CodecResult<Vec<u8>> {
        let packet = match request {
            Request::Query(packet) => Packet::Query(packet.clone()),
            Request::GetDocsums(docsums) => Packet::GetDocsums(GetDocsumsPacket {
                summary_class: docsums.summary_class.clone(),
                ranking: docsums.ranking.clone(),
                gids: docsums.gids.clone(),
            }),
            Request::Search(_) => return Err(wrong_protocol(request, self.protocol())),
        };
        packet.encode(channel_id)
    }

    fn decode(&self, channel_id: u32, frame: &[u8]) -> CodecResult<Vec<Response>> {
        let (reply_channel, packet) = Packet::decode(frame)?;
        if reply_channel != channel_id {
            log::debug!(
                "{} for channel {} arrived on channel {}",
                packet.name(),
                reply_channel,
                channel_id
            );
            return Ok(vec![Response::Unexpected(format!(
                "{} for channel {}",
                packet.name(),
                reply_channel
            ))]);
        }
        let response = match packet {
            Packet::QueryResult(result) => Response::QueryResult(result),
            Packet::Docsum(docsum) => Response::Docsum {
                gid: docsum.gid,
                data: docsum.data,
            },
            Packet::Error(error) => Response::Error {
                code: error.error_code,
                message: error.message,
            },
            Packet::Eol => Response::Eol,
            other => Response::Unexpected(other.name().to_string()),
        };
        Ok(vec![response])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RpcCodec;

impl WireCodec for RpcCodec {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Rpc
    }

    fn encode(&self, _channel_id: u32, request: &Request) -> CodecResult<Vec<u8>> {
        let message = match request {
            Request::Search(search) => RpcMessage::Search(search.clone()),
            Request::GetDocsums(docsums) => RpcMessage::GetDocsums(docsums.clone()),
            Request::Query(_) => return Err(wrong_protocol(request, self.protocol())),
        };
        message.encode()
    }

    fn decode(&self, _channel_id: u32, frame: &[u8]) -> CodecResult<Vec<Response>> {
        let responses = match RpcMessage::decode(frame)? {
            RpcMessage::SearchReply(reply) => vec![Response::SearchReply(reply)],
            RpcMessage::DocsumReply(reply) => {
                let mut responses: Vec<Response> = reply
                    .errors
                    .into_iter()
                    .map(|error| Response::Error {
                        code: error.code,
                        message: error.message,
                    })
                    .collect();
                responses.extend(
                    reply
                        .docsums
                        .into_iter()
                        .map(|docsum| Response::Docsum {
                            gid: docsum.gid,
                            data: docsum.data,
                        }),
                );
                responses.push(Response::Eol);
                responses
            }
            RpcMessage::Error(error) => vec![Response::Error {
                code: error.code,
                message: error.message,
            }],
            other => vec![Response::Unexpected(other.kind().to_string())],
        };
        Ok(responses)
    }
}
