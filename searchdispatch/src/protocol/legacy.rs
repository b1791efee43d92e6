// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Legacy framed-binary protocol
//!
//! Frame Format (big-endian):
//! - Length (u32): bytes following this field
//! - Packet code (u32)
//! - Channel id (u32)
//! - Body: packet specific
//!
//! Query packet body: features, offset, hits, timeout ms, flags, then the optional sections
//! selected by the feature bits in this order: ranking profile, property maps, sort spec,
//! query stack.
//!
//! Query result body: features, offset, document count, total hits, max rank, coverage if
//! flagged, then the documents.

use super::error::{CodecError, CodecResult};
use super::map_encoder::{decode_map, EncodedMap};
use super::wire::{WireReader, WireWrite};
use super::{GlobalId, GLOBAL_ID_LENGTH, MAX_FRAME_SIZE};
use crate::coverage::Coverage;
use crate::query::Query;

pub const PCODE_EOL: u32 = 200;
pub const PCODE_ERROR: u32 = 203;
pub const PCODE_DOCSUM: u32 = 205;
pub const PCODE_QUERYRESULTX: u32 = 217;
pub const PCODE_QUERYX: u32 = 218;
pub const PCODE_GETDOCSUMSX: u32 = 219;

/// Query packet feature bits
pub mod query_features {
    pub const RANKP: u32 = 0x0000_0004;
    pub const SORTSPEC: u32 = 0x0000_0080;
    pub const PROPERTIES: u32 = 0x0010_0000;
    pub const PARSEDQUERY: u32 = 0x0040_0000;
}

/// Query result packet feature bits
pub mod result_features {
    pub const MLD: u32 = 0x0000_0001;
    pub const SORTDATA: u32 = 0x0000_0010;
    pub const COVERAGE: u32 = 0x0000_0080;
}

/// Query flag asking the backend to skip its own result cache
pub const QFLAG_NO_RESULTCACHE: u32 = 0x0000_0080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPacket {
    pub offset: u32,
    pub hits: u32,
    pub timeout_ms: u32,
    pub flags: u32,
    pub ranking: Option<String>,
    pub property_maps: Vec<EncodedMap>,
    pub sort_spec: Option<String>,
    pub query_stack: Vec<u8>,
}

impl QueryPacket {
    /// Builds the packet for `query`; rank features must already be prepared
    pub fn from_query(query: &Query) -> Self {
        let property_maps = [
            EncodedMap::from_entries("rank", query.rank_properties().iter()),
            EncodedMap::from_entries("feature", query.rank_features().iter()),
        ]
        .into_iter()
        .flatten()
        .collect();

        let ranking = match query.ranking() {
            "" => None,
            profile => Some(profile.to_string()),
        };

        Self {
            offset: query.offset(),
            hits: query.hits(),
            timeout_ms: query.time_left().as_millis().min(u32::MAX as u128) as u32,
            flags: if query.no_cache() {
                QFLAG_NO_RESULTCACHE
            } else {
                0
            },
            ranking,
            property_maps,
            sort_spec: query.sorting().map(|sorting| sorting.to_wire_spec()),
            query_stack: query.query_tree().as_bytes().to_vec(),
        }
    }

    pub fn features(&self) -> u32 {
        let mut features = 0;
        if self.ranking.is_some() {
            features |= query_features::RANKP;
        }
        if !self.property_maps.is_empty() {
            features |= query_features::PROPERTIES;
        }
        if self.sort_spec.is_some() {
            features |= query_features::SORTSPEC;
        }
        if !self.query_stack.is_empty() {
            features |= query_features::PARSEDQUERY;
        }
        features
    }

    pub fn property_map(&self, name: &str) -> Option<&EncodedMap> {
        self.property_maps.iter().find(|map| map.name == name)
    }

    /// Packet bytes with the window and timeout zeroed; identical for equivalent queries
    pub fn cache_key_bytes(&self) -> Vec<u8> {
        let mut packet = self.clone();
        packet.offset = 0;
        packet.hits = 0;
        packet.timeout_ms = 0;
        let mut buffer = Vec::new();
        packet.write_body(&mut buffer);
        buffer
    }

    fn write_body(&self, buffer: &mut Vec<u8>) {
        buffer.put_u32(self.features());
        buffer.put_u32(self.offset);
        buffer.put_u32(self.hits);
        buffer.put_u32(self.timeout_ms);
        buffer.put_u32(self.flags);
        if let Some(ranking) = &self.ranking {
            buffer.put_str(ranking);
        }
        if !self.property_maps.is_empty() {
            buffer.put_u32(self.property_maps.len() as u32);
            for map in &self.property_maps {
                map.write(buffer);
            }
        }
        if let Some(sort_spec) = &self.sort_spec {
            buffer.put_str(sort_spec);
        }
        if !self.query_stack.is_empty() {
            buffer.put_bytes(&self.query_stack);
        }
    }

    fn read_body(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        let features = reader.get_u32()?;
        let offset = reader.get_u32()?;
        let hits = reader.get_u32()?;
        let timeout_ms = reader.get_u32()?;
        let flags = reader.get_u32()?;
        let ranking = if features & query_features::RANKP != 0 {
            Some(reader.get_string("ranking profile")?)
        } else {
            None
        };
        let mut property_maps = Vec::new();
        if features & query_features::PROPERTIES != 0 {
            let count = reader.get_u32()?;
            for _ in 0..count {
                property_maps.push(decode_map(reader)?);
            }
        }
        let sort_spec = if features & query_features::SORTSPEC != 0 {
            Some(reader.get_string("sort spec")?)
        } else {
            None
        };
        let query_stack = if features & query_features::PARSEDQUERY != 0 {
            reader.get_bytes()?.to_vec()
        } else {
            Vec::new()
        };
        Ok(Self {
            offset,
            hits,
            timeout_ms,
            flags,
            ranking,
            property_maps,
            sort_spec,
            query_stack,
        })
    }
}

/// Coverage block of a query result packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageBlock {
    pub docs: u64,
    pub active: u64,
    pub soon_active: u64,
    pub degraded: u32,
    pub nodes_queried: u16,
    pub nodes_replied: u16,
}

impl CoverageBlock {
    pub fn to_coverage(&self) -> Coverage {
        Coverage::from_bitmask(
            self.docs,
            self.active,
            self.soon_active,
            self.nodes_replied as u32,
            self.nodes_queried as u32,
            self.degraded,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyDocument {
    pub gid: GlobalId,
    pub metric: f64,
    pub partition_id: u32,
    pub distribution_key: u32,
    pub sort_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResultPacket {
    pub offset: u32,
    pub total_hits: u64,
    pub max_rank: f64,
    pub coverage: Option<CoverageBlock>,
    pub documents: Vec<LegacyDocument>,
}

impl QueryResultPacket {
    pub fn coverage_feature(&self) -> bool {
        self.coverage.is_some()
    }

    /// All active documents searched and no degradation; true when coverage was not reported
    pub fn coverage_full(&self) -> bool {
        match &self.coverage {
            Some(block) => block.docs == block.active && block.degraded == 0,
            None => true,
        }
    }

    fn has_sort_data(&self) -> bool {
        self.documents.iter().any(|doc| doc.sort_data.is_some())
    }

    fn features(&self) -> u32 {
        let mut features = result_features::MLD;
        if self.coverage.is_some() {
            features |= result_features::COVERAGE;
        }
        if self.has_sort_data() {
            features |= result_features::SORTDATA;
        }
        features
    }

    fn write_body(&self, buffer: &mut Vec<u8>) {
        let features = self.features();
        buffer.put_u32(features);
        buffer.put_u32(self.offset);
        buffer.put_u32(self.documents.len() as u32);
        buffer.put_u64(self.total_hits);
        buffer.put_f64(self.max_rank);
        if let Some(block) = &self.coverage {
            buffer.put_u64(block.docs);
            buffer.put_u64(block.active);
            buffer.put_u64(block.soon_active);
            buffer.put_u32(block.degraded);
            buffer.put_u16(block.nodes_queried);
            buffer.put_u16(block.nodes_replied);
        }
        for doc in &self.documents {
            buffer.extend_from_slice(doc.gid.as_bytes());
            buffer.put_f64(doc.metric);
            buffer.put_u32(doc.partition_id);
            buffer.put_u32(doc.distribution_key);
            if features & result_features::SORTDATA != 0 {
                buffer.put_bytes(doc.sort_data.as_deref().unwrap_or_default());
            }
        }
    }

    fn read_body(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        let features = reader.get_u32()?;
        let offset = reader.get_u32()?;
        let count = reader.get_u32()? as usize;
        let total_hits = reader.get_u64()?;
        let max_rank = reader.get_f64()?;
        let coverage = if features & result_features::COVERAGE != 0 {
            Some(CoverageBlock {
                docs: reader.get_u64()?,
                active: reader.get_u64()?,
                soon_active: reader.get_u64()?,
                degraded: reader.get_u32()?,
                nodes_queried: reader.get_u16()?,
                nodes_replied: reader.get_u16()?,
            })
        } else {
            None
        };

        let mut documents = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let gid = read_gid(reader)?;
            let metric = reader.get_f64()?;
            let (partition_id, distribution_key) = if features & result_features::MLD != 0 {
                (reader.get_u32()?, reader.get_u32()?)
            } else {
                (0, 0)
            };
            let sort_data = if features & result_features::SORTDATA != 0 {
                Some(reader.get_bytes()?.to_vec())
            } else {
                None
            };
            documents.push(LegacyDocument {
                gid,
                metric,
                partition_id,
                distribution_key,
                sort_data,
            });
        }

        Ok(Self {
            offset,
            total_hits,
            max_rank,
            coverage,
            documents,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDocsumsPacket {
    pub summary_class: String,
    pub ranking: String,
    pub gids: Vec<GlobalId>,
}

impl GetDocsumsPacket {
    fn write_body(&self, buffer: &mut Vec<u8>) {
        buffer.put_str(&self.summary_class);
        buffer.put_str(&self.ranking);
        buffer.put_u32(self.gids.len() as u32);
        for gid in &self.gids {
            buffer.extend_from_slice(gid.as_bytes());
        }
    }

    fn read_body(reader: &mut WireReader<'_>) -> CodecResult<Self> {
        let summary_class = reader.get_string("summary class")?;
        let ranking = reader.get_string("ranking profile")?;
        let count = reader.get_u32()? as usize;
        let mut gids = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            gids.push(read_gid(reader)?);
        }
        Ok(Self {
            summary_class,
            ranking,
            gids,
        })
    }
}

/// One document summary; the payload is a JSON object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsumPacket {
    pub gid: GlobalId,
    pub data: Vec<u8>,
}

impl DocsumPacket {
    pub fn fields(&self) -> CodecResult<serde_json::Map<String, serde_json::Value>> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPacket {
    pub error_code: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Query(QueryPacket),
    QueryResult(QueryResultPacket),
    GetDocsums(GetDocsumsPacket),
    Docsum(DocsumPacket),
    Error(ErrorPacket),
    Eol,
}

impl Packet {
    pub fn code(&self) -> u32 {
        match self {
            Packet::Query(_) => PCODE_QUERYX,
            Packet::QueryResult(_) => PCODE_QUERYRESULTX,
            Packet::GetDocsums(_) => PCODE_GETDOCSUMSX,
            Packet::Docsum(_) => PCODE_DOCSUM,
            Packet::Error(_) => PCODE_ERROR,
            Packet::Eol => PCODE_EOL,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::Query(_) => "QueryPacket",
            Packet::QueryResult(_) => "QueryResultPacket",
            Packet::GetDocsums(_) => "GetDocsumsPacket",
            Packet::Docsum(_) => "DocsumPacket",
            Packet::Error(_) => "ErrorPacket",
            Packet::Eol => "EolPacket",
        }
    }

    /// Complete frame, including the length prefix
    pub fn encode(&self, channel_id: u32) -> CodecResult<Vec<u8>> {
        let mut body = Vec::new();
        match self {
            Packet::Query(packet) => packet.write_body(&mut body),
            Packet::QueryResult(packet) => packet.write_body(&mut body),
            Packet::GetDocsums(packet) => packet.write_body(&mut body),
            Packet::Docsum(packet) => {
                body.extend_from_slice(packet.gid.as_bytes());
                body.extend_from_slice(&packet.data);
            }
            Packet::Error(packet) => {
                body.put_u32(packet.error_code);
                body.put_str(&packet.message);
            }
            Packet::Eol => {}
        }

        let length = body.len() + 8;
        if length > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: length,
                limit: MAX_FRAME_SIZE,
            });
        }
        let mut frame = Vec::with_capacity(length + 4);
        frame.put_u32(length as u32);
        frame.put_u32(self.code());
        frame.put_u32(channel_id);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decodes a frame without its length prefix; returns the channel id and packet
    pub fn decode(frame: &[u8]) -> CodecResult<(u32, Packet)> {
        let mut reader = WireReader::new(frame);
        let code = reader.get_u32()?;
        let channel_id = reader.get_u32()?;
        let packet = match code {
            PCODE_QUERYX => Packet::Query(QueryPacket::read_body(&mut reader)?),
            PCODE_QUERYRESULTX => Packet::QueryResult(QueryResultPacket::read_body(&mut reader)?),
            PCODE_GETDOCSUMSX => Packet::GetDocsums(GetDocsumsPacket::read_body(&mut reader)?),
            PCODE_DOCSUM => {
                let gid = read_gid(&mut reader)?;
                let data = reader.take(reader.remaining())?.to_vec();
                Packet::Docsum(DocsumPacket { gid, data })
            }
            PCODE_ERROR => Packet::Error(ErrorPacket {
                error_code: reader.get_u32()?,
                message: reader.get_string("error message")?,
            }),
            PCODE_EOL => Packet::Eol,
            other => return Err(CodecError::UnknownPacketCode(other)),
        };
        if !reader.is_empty() {
            return Err(CodecError::Malformed(format!(
                "{} with {} trailing bytes",
                packet.name(),
                reader.remaining()
            )));
        }
        Ok((channel_id, packet))
    }
}

fn read_gid(reader: &mut WireReader<'_>) -> CodecResult<GlobalId> {
    let mut gid = [0u8; GLOBAL_ID_LENGTH];
    gid.copy_from_slice(reader.take(GLOBAL_ID_LENGTH)?);
    Ok(GlobalId(gid))
}
