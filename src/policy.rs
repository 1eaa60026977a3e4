//! Accept/reject policy for reduced track files.
//!
//! All sizes and thresholds are in bytes. The retained percentage uses
//! truncating integer division, so `501 * 100 / 1000` is 50, not 50.1.

/// Outcome of comparing an original file with its reduced version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionDecision {
    /// Original is below the size floor (or empty)
    SkipTooSmall,
    /// Reduced file keeps more than the allowed share of the original
    SkipInsufficientReduction { retained_percent: u64 },
    /// Reduced file should replace the original
    Accept { retained_percent: u64 },
}

impl ReductionDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, ReductionDecision::Accept { .. })
    }
}

/// `simplified * 100 / original`, truncated. `None` for an empty original.
pub fn retained_percent(original_size: u64, simplified_size: u64) -> Option<u64> {
    if original_size == 0 {
        return None;
    }
    Some(simplified_size.saturating_mul(100) / original_size)
}

/// Decide whether a reduced file should replace the original.
pub fn should_replace(
    original_size: u64,
    simplified_size: u64,
    min_size_bytes: u64,
    max_retained_percent: u64,
) -> ReductionDecision {
    if original_size < min_size_bytes {
        return ReductionDecision::SkipTooSmall;
    }
    let Some(retained_percent) = retained_percent(original_size, simplified_size) else {
        return ReductionDecision::SkipTooSmall;
    };
    if retained_percent > max_retained_percent {
        ReductionDecision::SkipInsufficientReduction { retained_percent }
    } else {
        ReductionDecision::Accept { retained_percent }
    }
}

/// Configured thresholds for [`should_replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionPolicy {
    /// Files smaller than this are never touched
    pub min_size_bytes: u64,
    /// Largest acceptable `simplified * 100 / original`
    pub max_retained_percent: u64,
}

impl Default for ReductionPolicy {
    fn default() -> Self {
        Self {
            min_size_bytes: 0,
            max_retained_percent: 100,
        }
    }
}

impl ReductionPolicy {
    /// Size floor check, applied to the raw download before simplifying.
    pub fn is_too_small(&self, original_size: u64) -> bool {
        original_size < self.min_size_bytes || original_size == 0
    }

    pub fn decide(&self, original_size: u64, simplified_size: u64) -> ReductionDecision {
        should_replace(
            original_size,
            simplified_size,
            self.min_size_bytes,
            self.max_retained_percent,
        )
    }
}
