//! # Watchdog Sizing
//!
//! The hardware watchdog aborts hung fixed-function execution. Its window
//! scales with the frame area: larger frames take longer to process, and
//! are given longer before the engine is declared hung.

use magma_cmd::WatchdogThreshold;

use crate::config::CodecFunction;

/// Window used when the frame is below every tier, including 0x0
pub const DEFAULT_THRESHOLD_MS: u32 = 60;

struct Tier {
    area: u64,
    decode_ms: u32,
    encode_ms: u32,
}

const fn area(width: u64, height: u64) -> u64 {
    width * height
}

/// Largest tier first
const TIERS: [Tier; 4] = [
    Tier {
        area: area(15_360, 8_640),
        decode_ms: 180,
        encode_ms: 2000,
    },
    Tier {
        area: area(7_680, 4_320),
        decode_ms: 100,
        encode_ms: 500,
    },
    Tier {
        area: area(3_840, 2_160),
        decode_ms: 50,
        encode_ms: 100,
    },
    Tier {
        area: area(1_920, 1_080),
        decode_ms: 30,
        encode_ms: 50,
    },
];

/// Watchdog window in milliseconds for a `width` x `height` frame
pub fn threshold_ms(codec: CodecFunction, width: u32, height: u32) -> u32 {
    let frame = u64::from(width) * u64::from(height);
    TIERS
        .iter()
        .find(|tier| frame >= tier.area)
        .map_or(DEFAULT_THRESHOLD_MS, |tier| match codec {
            CodecFunction::Decode => tier.decode_ms,
            CodecFunction::Encode => tier.encode_ms,
        })
}

/// Watchdog counter value for a `width` x `height` frame
pub fn threshold(
    codec: CodecFunction,
    width: u32,
    height: u32,
    ticks_per_ms: u32,
) -> WatchdogThreshold {
    WatchdogThreshold(threshold_ms(codec, width, height).saturating_mul(ticks_per_ms))
}
