//! Credit pricing for generation jobs.
//!
//! Pure functions only. The price is computed exactly once, at intake,
//! and stored on the job row; refunds re-use the stored amount rather
//! than re-deriving it, so these tables can change without affecting
//! jobs already in flight.

use crate::types::{GenerationKind, GenerationSettings};

// ---------------------------------------------------------------------------
// Quality tiers
// ---------------------------------------------------------------------------

/// Cheapest tier, used whenever the tier is omitted or unrecognized.
pub const TIER_STANDARD: &str = "standard";
/// Mid tier.
pub const TIER_HIGH: &str = "high";
/// Top tier.
pub const TIER_MAX: &str = "max";

/// All valid quality tiers, cheapest first.
pub const VALID_TIERS: &[&str] = &[TIER_STANDARD, TIER_HIGH, TIER_MAX];

/// Quality tier, parsed leniently: unknown input falls back to `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityTier {
    Standard,
    High,
    Max,
}

impl QualityTier {
    /// Parse a tier name. Unknown or absent names map to `Standard`,
    /// matching the provider's own default.
    pub fn parse(tier: Option<&str>) -> Self {
        match tier {
            Some(TIER_HIGH) => Self::High,
            Some(TIER_MAX) => Self::Max,
            _ => Self::Standard,
        }
    }

    /// Tier name as sent to the provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => TIER_STANDARD,
            Self::High => TIER_HIGH,
            Self::Max => TIER_MAX,
        }
    }
}

// ---------------------------------------------------------------------------
// Price tables
// ---------------------------------------------------------------------------

/// Image base price per tier, in credits.
const IMAGE_BASE: [(QualityTier, i32); 3] = [
    (QualityTier::Standard, 1),
    (QualityTier::High, 2),
    (QualityTier::Max, 5),
];

/// Video price per tier, in credits. Two orders of magnitude above image
/// pricing; video renders occupy provider GPUs for minutes, not seconds.
const VIDEO_BASE: [(QualityTier, i32); 3] = [
    (QualityTier::Standard, 100),
    (QualityTier::High, 200),
    (QualityTier::Max, 500),
];

/// Flat surcharge per enabled image modifier (e.g. face restoration).
/// Modifiers are additive, never multiplicative.
const MODIFIER_SURCHARGE: i32 = 1;

fn base_price(table: &[(QualityTier, i32); 3], tier: QualityTier) -> i32 {
    table
        .iter()
        .find(|(t, _)| *t == tier)
        .map(|(_, p)| *p)
        .unwrap_or(table[0].1)
}

// ---------------------------------------------------------------------------
// Cost calculation
// ---------------------------------------------------------------------------

/// Credit cost of an image generation at the given tier with the given
/// number of enabled modifiers.
pub fn image_cost(tier: QualityTier, modifier_count: u32) -> i32 {
    base_price(&IMAGE_BASE, tier) + MODIFIER_SURCHARGE * modifier_count as i32
}

/// Credit cost of a video generation at the given tier.
pub fn video_cost(tier: QualityTier) -> i32 {
    base_price(&VIDEO_BASE, tier)
}

/// Count the modifiers enabled in a settings bag. Currently only
/// face restoration qualifies; new modifiers slot in here.
pub fn enabled_modifiers(settings: &GenerationSettings) -> u32 {
    u32::from(settings.restore_faces == Some(true))
}

/// Credit cost for a generation job, derived from its kind and settings.
///
/// Deterministic and referentially transparent: identical inputs always
/// produce the identical price.
pub fn generation_cost(kind: GenerationKind, settings: &GenerationSettings) -> i32 {
    let tier = QualityTier::parse(settings.quality.as_deref());
    match kind {
        GenerationKind::Image => image_cost(tier, enabled_modifiers(settings)),
        GenerationKind::Video => video_cost(tier),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
