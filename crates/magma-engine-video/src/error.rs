//! # Video Engine Errors
//!
//! Structured submission errors. Every error names the pipeline step that
//! failed and, when the failure happened while recording a pipe's stream,
//! which pipe.
//!
//! Invariant violations (a second status `start` on an open slot, an `end`
//! without a `start`) are not represented here: they are assertions.

use core::fmt;

use magma_core::ByteSize;

use crate::packet::PacketId;
use crate::registry::{Capability, LogicalId, SubPacketKey};

// =============================================================================
// RESULT TYPE
// =============================================================================

/// Video engine Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// STEP
// =============================================================================

/// Point of the submission sequence an error was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Session construction
    Construct,
    /// Frame preparation (status slot, pipe activation)
    Prepare,
    /// Pre-process hook
    PreProcess,
    /// Destination / bitstream resource synchronization
    ResourceSync,
    /// Watchdog stop/start
    Watchdog,
    /// Force wake-up and tracked prolog
    Prolog,
    /// All-pipes barrier
    SyncAllPipes,
    /// Picture-level validation
    Validate,
    /// Status report start
    StatusStart,
    /// Picture-level commands
    Picture,
    /// Tile-level commands
    Tile,
    /// Memory flush, pipe unlock, unit id, pipeline flush, flush
    FlushSequence,
    /// Rendezvous barrier
    Rendezvous,
    /// Status end / global count update, or follower predicate
    StatusFinalize,
    /// Final flush and end-of-buffer marker
    Terminate,
    /// Post-process hook
    PostProcess,
    /// Hand-off to the submit target
    Submit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Construct => "construct",
            Self::Prepare => "prepare",
            Self::PreProcess => "pre-process",
            Self::ResourceSync => "resource sync",
            Self::Watchdog => "watchdog",
            Self::Prolog => "prolog",
            Self::SyncAllPipes => "sync all pipes",
            Self::Validate => "validate",
            Self::StatusStart => "status start",
            Self::Picture => "picture",
            Self::Tile => "tile",
            Self::FlushSequence => "flush sequence",
            Self::Rendezvous => "rendezvous",
            Self::StatusFinalize => "status finalize",
            Self::Terminate => "terminate",
            Self::PostProcess => "post-process",
            Self::Submit => "submit",
        };
        f.write_str(name)
    }
}

// =============================================================================
// ERROR KINDS
// =============================================================================

/// Picture-level precondition failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Frame has a zero dimension
    EmptyFrame {
        /// Frame width
        width: u32,
        /// Frame height
        height: u32,
    },
    /// Frame exceeds the engine's maximum dimensions
    FrameTooLarge {
        /// Frame width
        width: u32,
        /// Frame height
        height: u32,
    },
    /// No bitstream data to decode
    EmptyBitstream,
    /// Tile layout does not fit the frame
    InvalidTileLayout {
        /// Tile columns
        cols: u16,
        /// Tile rows
        rows: u16,
    },
    /// Multi-pipe decode without a stream-out buffer
    MissingStreamOut,
    /// Stream-out buffer smaller than the frame needs
    StreamOutTooSmall {
        /// Bytes the frame needs
        required: ByteSize,
        /// Bytes provided
        actual: ByteSize,
    },
    /// Buffer size does not fit a 32-bit size field
    BufferTooLarge(ByteSize),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyFrame { width, height } => write!(f, "empty frame {width}x{height}"),
            Self::FrameTooLarge { width, height } => write!(f, "frame {width}x{height} too large"),
            Self::EmptyBitstream => write!(f, "empty bitstream"),
            Self::InvalidTileLayout { cols, rows } => write!(f, "invalid tile layout {cols}x{rows}"),
            Self::MissingStreamOut => write!(f, "stream-out buffer required for multi-pipe decode"),
            Self::StreamOutTooSmall { required, actual } => {
                write!(f, "stream-out buffer too small: need {required}, have {actual}")
            },
            Self::BufferTooLarge(size) => write!(f, "buffer of {size} exceeds the size field"),
        }
    }
}

/// Missing or mismatched collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyError {
    /// No sub-packet registered under the key
    MissingSubPacket(SubPacketKey),
    /// Sub-packet registered but with another capability
    CapabilityMismatch {
        /// Looked-up key
        key: SubPacketKey,
        /// Capability the caller needs
        expected: Capability,
        /// Capability registered
        found: Capability,
    },
    /// Logical id registered twice
    DuplicateSubPacket(LogicalId),
    /// Packet id registered twice
    DuplicatePacket(PacketId),
    /// No packet with this id in the pipeline
    UnknownPacket(PacketId),
    /// Pipeline has no packets to run
    NoPackets,
}

impl fmt::Display for DependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSubPacket(key) => write!(f, "sub-packet {key} not registered"),
            Self::CapabilityMismatch { key, expected, found } => {
                write!(f, "sub-packet {key} is {found:?}, expected {expected:?}")
            },
            Self::DuplicateSubPacket(id) => write!(f, "sub-packet {id:?} registered twice"),
            Self::DuplicatePacket(id) => write!(f, "packet {id:?} registered twice"),
            Self::UnknownPacket(id) => write!(f, "packet {id:?} not in pipeline"),
            Self::NoPackets => write!(f, "pipeline has no packets"),
        }
    }
}

/// Invalid session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Status ring capacity outside `1..=MAX_FRAMES_IN_FLIGHT`
    FramesInFlight(usize),
    /// Pipe count outside `1..=MAX_PIPES`
    PipeCount(u8),
    /// Watchdog tick rate is zero
    WatchdogFrequency,
    /// Command buffer too small to hold a frame
    CommandBufferSize(usize),
    /// Status memory layout is unusable
    StatusLayout(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FramesInFlight(n) => write!(f, "frames in flight {n} out of range"),
            Self::PipeCount(n) => write!(f, "pipe count {n} out of range"),
            Self::WatchdogFrequency => write!(f, "watchdog tick rate is zero"),
            Self::CommandBufferSize(n) => write!(f, "command buffer of {n} dwords too small"),
            Self::StatusLayout(reason) => write!(f, "status layout: {reason}"),
        }
    }
}

/// Failure reported by a platform pre/post hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    /// Hook refused the submission
    Rejected(&'static str),
    /// Platform status code
    Platform(i32),
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::Platform(code) => write!(f, "platform status {code}"),
        }
    }
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Picture-level precondition failed; nothing was submitted
    Validation(ValidationError),
    /// Required collaborator missing; fatal for the session
    Dependency(DependencyError),
    /// Hardware watchdog fired; not retried
    HardwareTimeout,
    /// Command recording or submission failed
    Command(magma_core::Error),
    /// Platform hook failed
    Hook(HookError),
    /// Every status slot holds a frame the GPU has not completed
    StatusRingFull {
        /// Frames submitted but not yet completed
        in_flight: u32,
    },
    /// Invalid configuration
    Config(ConfigError),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "validation error: {e}"),
            Self::Dependency(e) => write!(f, "dependency error: {e}"),
            Self::HardwareTimeout => write!(f, "hardware watchdog timeout"),
            Self::Command(e) => write!(f, "command error: {e}"),
            Self::Hook(e) => write!(f, "hook error: {e}"),
            Self::StatusRingFull { in_flight } => {
                write!(f, "status ring full ({in_flight} frames in flight)")
            },
            Self::Config(e) => write!(f, "config error: {e}"),
        }
    }
}

impl From<ValidationError> for ErrorKind {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DependencyError> for ErrorKind {
    fn from(e: DependencyError) -> Self {
        Self::Dependency(e)
    }
}

impl From<magma_core::Error> for ErrorKind {
    fn from(e: magma_core::Error) -> Self {
        match e {
            magma_core::Error::GpuHang => Self::HardwareTimeout,
            other => Self::Command(other),
        }
    }
}

impl From<HookError> for ErrorKind {
    fn from(e: HookError) -> Self {
        Self::Hook(e)
    }
}

impl From<ConfigError> for ErrorKind {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// =============================================================================
// ERROR
// =============================================================================

/// Submission error with step and pipe context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    step: Step,
    pipe: Option<u8>,
    kind: ErrorKind,
}

impl Error {
    /// Error raised outside any pipe's stream
    pub fn new(step: Step, kind: impl Into<ErrorKind>) -> Self {
        Self {
            step,
            pipe: None,
            kind: kind.into(),
        }
    }

    /// Error raised while recording `pipe`'s stream
    pub fn on_pipe(step: Step, pipe: u8, kind: impl Into<ErrorKind>) -> Self {
        Self {
            step,
            pipe: Some(pipe),
            kind: kind.into(),
        }
    }

    /// Step that failed
    pub fn step(&self) -> Step {
        self.step
    }

    /// Pipe whose stream was being recorded
    pub fn pipe(&self) -> Option<u8> {
        self.pipe
    }

    /// What went wrong
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Session cannot continue (missing collaborator, bad configuration)
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self.kind, ErrorKind::Dependency(_) | ErrorKind::Config(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pipe {
            Some(pipe) => write!(f, "{} (pipe {}): {}", self.step, pipe, self.kind),
            None => write!(f, "{}: {}", self.step, self.kind),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Attach step and pipe context to a lower-level result
pub(crate) trait ResultExt<T> {
    /// Fail at `step` while recording `pipe`
    fn at(self, step: Step, pipe: u8) -> Result<T>;

    /// Fail at `step` outside any pipe's stream
    fn at_step(self, step: Step) -> Result<T>;
}

impl<T, E: Into<ErrorKind>> ResultExt<T> for core::result::Result<T, E> {
    fn at(self, step: Step, pipe: u8) -> Result<T> {
        self.map_err(|e| Error::on_pipe(step, pipe, e))
    }

    fn at_step(self, step: Step) -> Result<T> {
        self.map_err(|e| Error::new(step, e))
    }
}
