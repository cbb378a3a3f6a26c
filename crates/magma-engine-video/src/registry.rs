//! # Sub-Packet Registry
//!
//! Maps `(pipeline, logical id)` to a reusable sub-packet. Entries are
//! tagged with their capability, so a lookup hands back the typed
//! interface directly and a wrong kind is a [`DependencyError`] rather
//! than a failed cast.
//!
//! The registry is filled through [`RegistryBuilder`] while the session is
//! constructed and has no insertion API afterwards.

use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use hashbrown::HashMap;

use crate::error::DependencyError;
use crate::packet::{PictureSubPacket, TileSubPacket};

// =============================================================================
// IDENTIFIERS
// =============================================================================

static NEXT_PIPELINE_ID: AtomicU32 = AtomicU32::new(1);

/// Identifier of one pipeline instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(u32);

impl PipelineId {
    /// Allocate a fresh, process-unique id
    pub fn next() -> Self {
        Self(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Symbolic sub-packet id within a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalId(pub u16);

impl LogicalId {
    /// Picture-level decode commands
    pub const PICTURE: Self = Self(1);
    /// Tile-level decode commands
    pub const TILE: Self = Self(2);
}

/// Registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubPacketKey {
    /// Owning pipeline
    pub pipeline: PipelineId,
    /// Logical id
    pub logical: LogicalId,
}

impl SubPacketKey {
    /// Key for `logical` in `pipeline`
    pub const fn new(pipeline: PipelineId, logical: LogicalId) -> Self {
        Self { pipeline, logical }
    }
}

impl fmt::Display for SubPacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pipeline.0, self.logical.0)
    }
}

// =============================================================================
// SUB-PACKETS
// =============================================================================

/// What a registered sub-packet can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Picture-level commands
    Picture,
    /// Per-pipe tile commands
    Tile,
}

/// Registered sub-packet, tagged by capability
pub enum SubPacket {
    /// Picture-level sub-packet
    Picture(Box<dyn PictureSubPacket>),
    /// Tile-level sub-packet
    Tile(Box<dyn TileSubPacket>),
}

impl SubPacket {
    /// Capability of the entry
    pub fn capability(&self) -> Capability {
        match self {
            Self::Picture(_) => Capability::Picture,
            Self::Tile(_) => Capability::Tile,
        }
    }
}

impl fmt::Debug for SubPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubPacket::{:?}", self.capability())
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Collects the sub-packets of one pipeline
#[derive(Debug)]
pub struct RegistryBuilder {
    pipeline: PipelineId,
    entries: HashMap<LogicalId, SubPacket>,
}

impl RegistryBuilder {
    /// Builder for `pipeline`
    pub fn new(pipeline: PipelineId) -> Self {
        Self {
            pipeline,
            entries: HashMap::new(),
        }
    }

    /// Pipeline the registry belongs to
    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// Register `sub_packet` under `id`
    pub fn register(&mut self, id: LogicalId, sub_packet: SubPacket) -> Result<(), DependencyError> {
        if self.entries.contains_key(&id) {
            return Err(DependencyError::DuplicateSubPacket(id));
        }
        log::trace!(
            "registered {:?} as {}",
            sub_packet,
            SubPacketKey::new(self.pipeline, id)
        );
        self.entries.insert(id, sub_packet);
        Ok(())
    }

    /// Freeze the registry
    pub fn build(self) -> SubPacketRegistry {
        SubPacketRegistry {
            pipeline: self.pipeline,
            entries: self.entries,
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Immutable set of sub-packets of one pipeline
#[derive(Debug)]
pub struct SubPacketRegistry {
    pipeline: PipelineId,
    entries: HashMap<LogicalId, SubPacket>,
}

impl SubPacketRegistry {
    /// Pipeline the registry belongs to
    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if `key` is registered
    pub fn contains(&self, key: SubPacketKey) -> bool {
        key.pipeline == self.pipeline && self.entries.contains_key(&key.logical)
    }

    /// Check that `key` is registered with `capability`
    pub fn require(&self, key: SubPacketKey, capability: Capability) -> Result<(), DependencyError> {
        let found = self.entry(key)?.capability();
        if found != capability {
            return Err(DependencyError::CapabilityMismatch {
                key,
                expected: capability,
                found,
            });
        }
        Ok(())
    }

    /// Picture sub-packet registered under `key`
    pub fn picture_mut(
        &mut self,
        key: SubPacketKey,
    ) -> Result<&mut dyn PictureSubPacket, DependencyError> {
        match self.entry_mut(key)? {
            SubPacket::Picture(p) => Ok(p.as_mut()),
            other => Err(DependencyError::CapabilityMismatch {
                key,
                expected: Capability::Picture,
                found: other.capability(),
            }),
        }
    }

    /// Tile sub-packet registered under `key`
    pub fn tile_mut(&mut self, key: SubPacketKey) -> Result<&mut dyn TileSubPacket, DependencyError> {
        match self.entry_mut(key)? {
            SubPacket::Tile(t) => Ok(t.as_mut()),
            other => Err(DependencyError::CapabilityMismatch {
                key,
                expected: Capability::Tile,
                found: other.capability(),
            }),
        }
    }

    fn entry(&self, key: SubPacketKey) -> Result<&SubPacket, DependencyError> {
        if key.pipeline != self.pipeline {
            return Err(DependencyError::MissingSubPacket(key));
        }
        self.entries
            .get(&key.logical)
            .ok_or(DependencyError::MissingSubPacket(key))
    }

    fn entry_mut(&mut self, key: SubPacketKey) -> Result<&mut SubPacket, DependencyError> {
        if key.pipeline != self.pipeline {
            return Err(DependencyError::MissingSubPacket(key));
        }
        self.entries
            .get_mut(&key.logical)
            .ok_or(DependencyError::MissingSubPacket(key))
    }
}
