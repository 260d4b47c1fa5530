//! Block planning for an ownership range
//!
//! Planning is a three-stage pipeline over an immutable snapshot of
//! segments and metas:
//!
//! 1. [`find_gaps`]: the parts of a range not covered by a set of intervals
//! 2. [`gaps_between_segments_and_metas`]: per segment, the parts of the
//!    ownership range no meta built from that segment covers
//! 3. [`block_plans_for_gaps`]: per gap, the existing blocks (built from other
//!    segments) that can be reused instead of re-reading raw log lines
//!
//! Every stage is a pure function of its inputs, so runs for disjoint
//! ranges or tenants can proceed in parallel without coordination.

mod aggregate;
mod gaps;
mod plan;

pub use aggregate::gaps_between_segments_and_metas;
pub use gaps::find_gaps;
pub use plan::{block_plans_for_gaps, dedupe_blocks};

use crate::bloom::{BlockRef, Meta};
use crate::config::PlannerConfig;
use crate::{FingerprintBounds, Result, SegmentId};
use serde::{Deserialize, Serialize};

/// Uncovered parts of the ownership range for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentGaps {
    pub segment: SegmentId,
    pub gaps: Vec<FingerprintBounds>,
}

/// A gap together with the existing blocks overlapping it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapWithBlocks {
    pub bounds: FingerprintBounds,
    pub blocks: Vec<BlockRef>,
}

impl GapWithBlocks {
    /// Create a gap annotated with reusable blocks
    pub fn new(bounds: FingerprintBounds, blocks: Vec<BlockRef>) -> Self {
        Self { bounds, blocks }
    }
}

/// The work needed for one segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPlan {
    pub segment: SegmentId,
    pub gaps: Vec<GapWithBlocks>,
}

/// Runs the planning pipeline with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Create a planner
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Planner configuration
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan the builds needed to cover `ownership` for every segment
    pub fn plan(
        &self,
        ownership: FingerprintBounds,
        segments: &[SegmentId],
        metas: &[Meta],
    ) -> Result<Vec<BlockPlan>> {
        let gaps =
            gaps_between_segments_and_metas(ownership, segments, metas, self.config.coverage_policy)?;
        block_plans_for_gaps(&gaps, metas)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::config::CoveragePolicy;
    use crate::BloomError;

    #[test]
    fn test_planner_pipeline() {
        let planner = Planner::default();
        let metas = vec![
            meta(0, 4, &[0], vec![block(0, 4)]),
            meta(5, 10, &[1], vec![block(5, 10)]),
        ];

        let plans = planner
            .plan(bounds(0, 10), &[segment(0), segment(1)], &metas)
            .unwrap();
        assert_eq!(
            plans,
            vec![
                BlockPlan {
                    segment: segment(0),
                    gaps: vec![GapWithBlocks::new(bounds(5, 10), vec![block(5, 10)])],
                },
                BlockPlan {
                    segment: segment(1),
                    gaps: vec![GapWithBlocks::new(bounds(0, 4), vec![block(0, 4)])],
                },
            ]
        );
    }

    #[test]
    fn test_planner_coverage_policy() {
        let metas = vec![meta(9, 20, &[1], vec![block(9, 20)])];
        let segments = [segment(0)];

        let strict = Planner::default();
        assert!(matches!(
            strict.plan(bounds(0, 10), &segments, &metas),
            Err(BloomError::MissingCoverage(_))
        ));

        let lenient = Planner::new(PlannerConfig {
            coverage_policy: CoveragePolicy::WholeRange,
        });
        let plans = lenient.plan(bounds(0, 10), &segments, &metas).unwrap();
        assert_eq!(
            plans,
            vec![BlockPlan {
                segment: segment(0),
                gaps: vec![GapWithBlocks::new(bounds(0, 10), vec![block(9, 20)])],
            }]
        );
    }
}
