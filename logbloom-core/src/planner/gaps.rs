//! Complement of a set of intervals within an ownership range

use crate::{BloomError, FingerprintBounds, Result};

/// Find the parts of `ownership` not covered by any interval in `covering`
///
/// `covering` may be unsorted and may overlap or touch. The returned gaps
/// are sorted, disjoint and never adjacent. An interval that shares no
/// fingerprint with `ownership` is a [`BloomError::RangeInconsistency`];
/// intervals that stick out past either end are clipped.
pub fn find_gaps(
    ownership: FingerprintBounds,
    covering: &[FingerprintBounds],
) -> Result<Vec<FingerprintBounds>> {
    if let Some(stray) = covering.iter().find(|c| !c.overlaps(&ownership)) {
        return Err(BloomError::RangeInconsistency {
            ownership,
            bounds: *stray,
        });
    }

    let mut sorted = covering.to_vec();
    sorted.sort();

    let mut gaps = Vec::new();
    // First fingerprint not yet known to be covered; None once the sweep
    // has passed ownership.max.
    let mut next = Some(ownership.min);

    for bounds in &sorted {
        let Some(start) = next else {
            break;
        };

        if bounds.min > start {
            // bounds overlaps ownership, so bounds.min <= ownership.max
            gaps.push(FingerprintBounds::new(start, bounds.min - 1));
        }

        if bounds.max >= start {
            next = if bounds.max >= ownership.max {
                None
            } else {
                Some(bounds.max + 1)
            };
        }
    }

    if let Some(start) = next {
        gaps.push(FingerprintBounds::new(start, ownership.max));
    }

    Ok(gaps)
}
