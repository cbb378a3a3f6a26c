//! Picture-level decode state.

use magma_cmd::{CommandBuffer, CommandEmitter, Method, VdControlFlags};
use magma_core::{ByteSize, Result};

use crate::error::ValidationError;
use crate::feature::{BasicFeature, MAX_FRAME_DIMENSION};
use crate::packet::{PacketPhase, PictureSubPacket};
use crate::scalability::PipeIdentity;

/// Stream-out bytes per superblock when pipes hand data across tiles
pub const STREAM_OUT_BYTES_PER_SB: u64 = 256;

const STREAM_OUT_ALIGN: u64 = 4096;

const CODEC_MODE_DECODE: u32 = 0;

/// Largest size a buffer-state size field holds
const MAX_BUFFER_SIZE: ByteSize = ByteSize::from_bytes(u32::MAX as u64);

#[inline]
fn size_field(size: ByteSize) -> u32 {
    u32::try_from(size.as_bytes()).unwrap_or(u32::MAX)
}

/// Stream-out buffer size a frame needs under multi-pipe decode
pub fn stream_out_size(feature: &BasicFeature) -> ByteSize {
    let sbs = u64::from(feature.sb_cols()) * u64::from(feature.sb_rows());
    ByteSize::from_bytes(sbs * STREAM_OUT_BYTES_PER_SB).align_up(STREAM_OUT_ALIGN)
}

/// Pipe mode, surfaces, buffers and picture state
#[derive(Debug)]
pub struct DecodePicturePacket {
    phase: PacketPhase,
}

impl DecodePicturePacket {
    /// New picture sub-packet
    pub fn new() -> Self {
        Self {
            phase: PacketPhase::Single,
        }
    }
}

impl Default for DecodePicturePacket {
    fn default() -> Self {
        Self::new()
    }
}

impl PictureSubPacket for DecodePicturePacket {
    fn set_phase(&mut self, phase: PacketPhase) {
        self.phase = phase;
    }

    fn validate(
        &self,
        feature: &BasicFeature,
        pipe: PipeIdentity,
    ) -> core::result::Result<(), ValidationError> {
        let (width, height) = (feature.width, feature.height);
        if width == 0 || height == 0 {
            return Err(ValidationError::EmptyFrame { width, height });
        }
        if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
            return Err(ValidationError::FrameTooLarge { width, height });
        }
        if feature.data_size == ByteSize::ZERO || feature.data_addr.is_null() {
            return Err(ValidationError::EmptyBitstream);
        }
        if feature.data_size > MAX_BUFFER_SIZE {
            return Err(ValidationError::BufferTooLarge(feature.data_size));
        }
        if let Some((_, size)) = feature.stream_out.filter(|(_, size)| *size > MAX_BUFFER_SIZE) {
            return Err(ValidationError::BufferTooLarge(size));
        }

        let (cols, rows) = (feature.tile_cols, feature.tile_rows);
        if cols == 0
            || rows == 0
            || u32::from(cols) > feature.sb_cols()
            || u32::from(rows) > feature.sb_rows()
        {
            return Err(ValidationError::InvalidTileLayout { cols, rows });
        }

        if pipe.is_scalable() {
            let (_, actual) = feature.stream_out.ok_or(ValidationError::MissingStreamOut)?;
            let required = stream_out_size(feature);
            if actual < required {
                return Err(ValidationError::StreamOutTooSmall { required, actual });
            }
        }
        Ok(())
    }

    fn execute(
        &mut self,
        feature: &BasicFeature,
        pipe: PipeIdentity,
        emitter: &mut dyn CommandEmitter,
        cmd: &mut CommandBuffer,
    ) -> Result<()> {
        let init = match self.phase {
            PacketPhase::Single => VdControlFlags::INITIALIZATION,
            _ => VdControlFlags::INITIALIZATION | VdControlFlags::SCALABLE_PIPE_LOCK,
        };
        emitter.vd_control_state(cmd, init)?;

        emitter.append_instruction(
            cmd,
            Method::PipeModeSelect,
            &[
                CODEC_MODE_DECODE,
                u32::from(pipe.is_scalable()),
                u32::from(pipe.index()),
                u32::from(pipe.count()),
            ],
        )?;

        let extent = (feature.width.saturating_sub(1) & 0xFFFF)
            | ((feature.height.saturating_sub(1) & 0xFFFF) << 16);
        emitter.append_instruction(
            cmd,
            Method::SurfaceState,
            &[feature.dest_addr.lo(), feature.dest_addr.hi(), extent],
        )?;

        let (so_addr, so_size) = feature.stream_out.unwrap_or_default();
        emitter.append_instruction(
            cmd,
            Method::PipeBufAddrState,
            &[
                feature.dest_addr.lo(),
                feature.dest_addr.hi(),
                so_addr.lo(),
                so_addr.hi(),
                size_field(so_size),
            ],
        )?;

        emitter.append_instruction(
            cmd,
            Method::IndObjBaseAddrState,
            &[
                feature.data_addr.lo(),
                feature.data_addr.hi(),
                size_field(feature.data_size),
            ],
        )?;

        emitter.append_instruction(
            cmd,
            Method::PicState,
            &[
                feature.sb_cols(),
                feature.sb_rows(),
                u32::from(feature.tile_cols) | (u32::from(feature.tile_rows) << 16),
                feature.frame_num,
            ],
        )
    }
}
