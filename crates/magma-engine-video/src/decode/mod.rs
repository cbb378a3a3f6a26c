//! # Decode Sub-Packets
//!
//! Picture-level and tile-level command generation for frame decode.

use alloc::boxed::Box;

use crate::error::DependencyError;
use crate::registry::{LogicalId, RegistryBuilder, SubPacket};

mod picture;
mod tile;

pub use picture::{stream_out_size, DecodePicturePacket, STREAM_OUT_BYTES_PER_SB};
pub use tile::DecodeTileSubPacket;

/// Register the decode sub-packets under their well-known ids
pub fn register_sub_packets(builder: &mut RegistryBuilder) -> Result<(), DependencyError> {
    builder.register(
        LogicalId::PICTURE,
        SubPacket::Picture(Box::new(DecodePicturePacket::new())),
    )?;
    builder.register(
        LogicalId::TILE,
        SubPacket::Tile(Box::new(DecodeTileSubPacket::new())),
    )
}
