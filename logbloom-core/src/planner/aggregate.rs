//! Per-segment gap aggregation

use super::{find_gaps, SegmentGaps};
use crate::bloom::Meta;
use crate::config::CoveragePolicy;
use crate::{BloomError, FingerprintBounds, Result, SegmentId};
use tracing::{debug, warn};

/// For every segment, find the parts of `ownership` that no meta built from
/// that segment covers
///
/// Segments keep their input order. Segments whose metas already cover the
/// whole ownership range are left out. A segment no meta references at all
/// is handled according to `policy`.
pub fn gaps_between_segments_and_metas(
    ownership: FingerprintBounds,
    segments: &[SegmentId],
    metas: &[Meta],
    policy: CoveragePolicy,
) -> Result<Vec<SegmentGaps>> {
    let mut result = Vec::with_capacity(segments.len());

    for segment in segments {
        let covering: Vec<FingerprintBounds> = metas
            .iter()
            .filter(|meta| meta.built_from(segment))
            .map(|meta| meta.bounds)
            .collect();

        if covering.is_empty() {
            match policy {
                CoveragePolicy::Reject => {
                    return Err(BloomError::MissingCoverage(segment.clone()));
                }
                CoveragePolicy::WholeRange => {
                    warn!(
                        "No meta references segment {}, planning full range {}",
                        segment, ownership
                    );
                }
            }
        }

        let gaps = find_gaps(ownership, &covering)?;
        debug!(
            "Segment {} has {} metas and {} gaps",
            segment,
            covering.len(),
            gaps.len()
        );

        if !gaps.is_empty() {
            result.push(SegmentGaps {
                segment: segment.clone(),
                gaps,
            });
        }
    }

    Ok(result)
}
