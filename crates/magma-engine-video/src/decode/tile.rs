//! Tile-level decode commands.
//!
//! Tile columns are dealt round-robin to pipes: pipe `i` of `n` decodes
//! every column `c` with `c % n == i`, for every tile row.

use magma_cmd::{CommandBuffer, CommandEmitter, Method};
use magma_core::Result;

use crate::feature::BasicFeature;
use crate::packet::TileSubPacket;
use crate::scalability::PipeIdentity;

const LAST_TILE: u32 = 1 << 31;

/// Per-tile coding parameters and BSD objects
#[derive(Debug, Default)]
pub struct DecodeTileSubPacket {
    recorded: u32,
}

impl DecodeTileSubPacket {
    /// New tile sub-packet
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiles recorded by the last [`execute`](TileSubPacket::execute)
    pub fn recorded(&self) -> u32 {
        self.recorded
    }
}

/// Check if tile column `col` belongs to `pipe`
#[inline]
fn owns_column(pipe: PipeIdentity, col: u16) -> bool {
    col % u16::from(pipe.count()) == u16::from(pipe.index())
}

impl TileSubPacket for DecodeTileSubPacket {
    fn execute(
        &mut self,
        feature: &BasicFeature,
        pipe: PipeIdentity,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> Result<()> {
        self.recorded = 0;
        let last = (feature.tile_cols.saturating_sub(1), feature.tile_rows.saturating_sub(1));

        for row in 0..feature.tile_rows {
            let (row_start, row_end) = feature.tile_row_bounds(row);
            for col in (0..feature.tile_cols).filter(|&c| owns_column(pipe, c)) {
                let (col_start, col_end) = feature.tile_col_bounds(col);
                let flags = if (col, row) == last { LAST_TILE } else { 0 };
                emitter.append_instruction(
                    cmd,
                    Method::TileCoding,
                    &[
                        u32::from(col) | (u32::from(row) << 16) | flags,
                        col_start | (col_end << 16),
                        row_start | (row_end << 16),
                    ],
                )?;

                let tile = u32::from(row) * u32::from(feature.tile_cols) + u32::from(col);
                emitter.append_instruction(
                    cmd,
                    Method::BsdObject,
                    &[tile, feature.data_addr.lo(), feature.data_addr.hi()],
                )?;
                self.recorded += 1;
            }
        }

        log::trace!("pipe {} recorded {} tiles", pipe.index(), self.recorded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use alloc::vec::Vec;
    use magma_cmd::MiEmitter;

    fn columns(cmd: &CommandBuffer) -> Vec<u32> {
        cmd.methods()
            .filter(|(m, _)| *m == Method::TileCoding)
            .map(|(_, d)| d[0] & 0xFFFF)
            .collect()
    }

    #[test]
    fn test_round_robin_columns() {
        let mut f = testing::feature(1920, 1080);
        f.tile_cols = 6;
        f.tile_rows = 2;
        let mut mi = MiEmitter::new();
        let mut tile = DecodeTileSubPacket::new();

        let mut cmd = CommandBuffer::new(1);
        tile.execute(&f, PipeIdentity::new(1, 4).unwrap(), &mut mi, &mut cmd)
            .unwrap();
        assert_eq!(columns(&cmd), [1, 5, 1, 5]);
        assert_eq!(tile.recorded(), 4);
    }

    #[test]
    fn test_pipe_without_columns_records_nothing() {
        let mut f = testing::feature(1920, 1080);
        f.tile_cols = 2;
        let mut mi = MiEmitter::new();
        let mut tile = DecodeTileSubPacket::new();
        let mut cmd = CommandBuffer::new(3);
        tile.execute(&f, PipeIdentity::new(3, 4).unwrap(), &mut mi, &mut cmd)
            .unwrap();
        assert!(cmd.method_ids().is_empty());
    }

    #[test]
    fn test_single_pipe_marks_last_tile() {
        let f = testing::feature(1920, 1080);
        let mut mi = MiEmitter::new();
        let mut tile = DecodeTileSubPacket::new();
        let mut cmd = CommandBuffer::new(0);
        tile.execute(&f, PipeIdentity::SINGLE, &mut mi, &mut cmd).unwrap();

        assert_eq!(cmd.method_ids(), [Method::TileCoding, Method::BsdObject]);
        let (_, coding) = cmd.methods().next().unwrap();
        assert_eq!(coding[0] & LAST_TILE, LAST_TILE);
        assert_eq!(coding[1], 30 << 16);
    }
}
