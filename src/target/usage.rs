//! Target Usage Tags
//!
//! Every pooled assignment and every lookup-table entry carries a
//! [`TargetUsage`] bitmask recording which pipeline stage produced it and,
//! for intermediate results, which ping-pong generation it belongs to.
//!
//! The generation is tracked separately as an [`IntermediateGeneration`] and
//! only folded into the tag set at the moment a request is tagged.

use bitflags::bitflags;

bitflags! {
    /// Usage tags attached to pooled targets and lookup-table entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TargetUsage: u32 {
        const INPUT = 1 << 0;
        const TRANSFORM = 1 << 1;
        const OUTPUT = 1 << 2;
        /// Exempt from per-frame reclaiming and wiping.
        const PERSISTENT = 1 << 3;
        const INTERMEDIATE0 = 1 << 4;
        const INTERMEDIATE1 = 1 << 5;

        /// The stage tags a freeze-frame mask may contain.
        const FREEZABLE = Self::INPUT.bits() | Self::TRANSFORM.bits() | Self::OUTPUT.bits();
        const INTERMEDIATE = Self::INTERMEDIATE0.bits() | Self::INTERMEDIATE1.bits();
    }
}

/// Which of the two intermediate bits is current.
///
/// Flipping the generation reclaims everything tagged with the generation
/// that becomes current, i.e. results that are now two flips old.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntermediateGeneration {
    #[default]
    Even,
    Odd,
}

impl IntermediateGeneration {
    #[inline]
    #[must_use]
    pub const fn tag(self) -> TargetUsage {
        match self {
            Self::Even => TargetUsage::INTERMEDIATE0,
            Self::Odd => TargetUsage::INTERMEDIATE1,
        }
    }

    #[inline]
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }
}
