//! # Frame Feature Data
//!
//! Read-only per-frame parameters shared by every packet of a submission.

use magma_core::{BufferHandle, ByteSize, GpuAddr, SurfaceHandle};

/// Superblock edge in pixels
pub const SUPERBLOCK_SIZE: u32 = 64;

/// Largest supported frame edge
pub const MAX_FRAME_DIMENSION: u32 = 16_384;

/// Per-frame parameters read by the packets
#[derive(Debug, Clone)]
pub struct BasicFeature {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Destination surface
    pub dest_surface: SurfaceHandle,
    /// GPU address of the destination surface
    pub dest_addr: GpuAddr,
    /// Bitstream data buffer
    pub data_buffer: BufferHandle,
    /// GPU address of the bitstream data
    pub data_addr: GpuAddr,
    /// Bitstream size
    pub data_size: ByteSize,
    /// Stream-out buffer (required when more than one pipe decodes the frame)
    pub stream_out: Option<(GpuAddr, ByteSize)>,
    /// Tile columns
    pub tile_cols: u16,
    /// Tile rows
    pub tile_rows: u16,
    /// Caller's frame counter, carried into picture state
    pub frame_num: u32,
}

impl BasicFeature {
    /// Single-tile frame without stream-out
    pub fn new(
        width: u32,
        height: u32,
        dest_surface: SurfaceHandle,
        dest_addr: GpuAddr,
        data_buffer: BufferHandle,
        data_addr: GpuAddr,
        data_size: ByteSize,
    ) -> Self {
        Self {
            width,
            height,
            dest_surface,
            dest_addr,
            data_buffer,
            data_addr,
            data_size,
            stream_out: None,
            tile_cols: 1,
            tile_rows: 1,
            frame_num: 0,
        }
    }

    /// Superblock columns
    #[inline]
    pub fn sb_cols(&self) -> u32 {
        self.width.div_ceil(SUPERBLOCK_SIZE)
    }

    /// Superblock rows
    #[inline]
    pub fn sb_rows(&self) -> u32 {
        self.height.div_ceil(SUPERBLOCK_SIZE)
    }

    /// Superblock range `[start, end)` covered by tile column `col`
    ///
    /// Columns are split uniformly, the last one absorbs the remainder.
    pub fn tile_col_bounds(&self, col: u16) -> (u32, u32) {
        uniform_bounds(self.sb_cols(), self.tile_cols, col)
    }

    /// Superblock range `[start, end)` covered by tile row `row`
    pub fn tile_row_bounds(&self, row: u16) -> (u32, u32) {
        uniform_bounds(self.sb_rows(), self.tile_rows, row)
    }
}

/// Split `total` superblocks into `parts`, returning part `index`
fn uniform_bounds(total: u32, parts: u16, index: u16) -> (u32, u32) {
    let parts = u32::from(parts.max(1));
    let index = u32::from(index).min(parts - 1);
    let size = total / parts;
    let start = index * size;
    let end = if index + 1 == parts { total } else { start + size };
    (start, end)
}
