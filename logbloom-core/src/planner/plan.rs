//! Block plans: which existing blocks can fill each gap

use super::{find_gaps, BlockPlan, GapWithBlocks, SegmentGaps};
use crate::bloom::{BlockRef, Meta};
use crate::{FingerprintBounds, Result};
use std::collections::HashSet;
use tracing::debug;

/// Turn per-segment gaps into block plans
///
/// For each gap of a segment:
/// - the parts covered by a meta built from that same segment are already
///   up to date and are trimmed off (the gap may split or vanish)
/// - every block of a meta built from other segments that overlaps what
///   remains is listed as reusable
///
/// Blocks within a gap are sorted by range (`min`, then `max`), not by the
/// order the metas list them in, and then deduplicated. References sharing a
/// range keep their discovery order. Gaps keep their order, and segments left
/// with no gaps are omitted.
pub fn block_plans_for_gaps(segments: &[SegmentGaps], metas: &[Meta]) -> Result<Vec<BlockPlan>> {
    let mut plans = Vec::with_capacity(segments.len());

    for entry in segments {
        let segment = &entry.segment;
        let mut plan = BlockPlan {
            segment: segment.clone(),
            gaps: Vec::with_capacity(entry.gaps.len()),
        };

        for gap in &entry.gaps {
            let up_to_date: Vec<FingerprintBounds> = metas
                .iter()
                .filter(|meta| meta.built_from(segment))
                .filter_map(|meta| meta.bounds.intersection(gap))
                .collect();

            for bounds in find_gaps(*gap, &up_to_date)? {
                let mut blocks: Vec<BlockRef> = metas
                    .iter()
                    .filter(|meta| !meta.built_from(segment) && meta.bounds.overlaps(&bounds))
                    .flat_map(|meta| meta.blocks.iter())
                    .filter(|block| block.bounds.overlaps(&bounds))
                    .cloned()
                    .collect();
                dedupe_blocks(&mut blocks);

                debug!(
                    "Planned gap {} for {} with {} reusable blocks",
                    bounds,
                    segment,
                    blocks.len()
                );
                plan.gaps.push(GapWithBlocks { bounds, blocks });
            }
        }

        if plan.gaps.is_empty() {
            debug!("Segment {} already up to date", segment);
            continue;
        }
        plans.push(plan);
    }

    Ok(plans)
}

/// Sort blocks by range and drop repeated references
///
/// The sort is stable, so references sharing a range keep the order they
/// were found in.
pub fn dedupe_blocks(blocks: &mut Vec<BlockRef>) {
    blocks.sort_by_key(|block| block.bounds);
    let mut seen = HashSet::with_capacity(blocks.len());
    blocks.retain(|block| seen.insert(block.clone()));
}
