//! Tiling parameter resolution
//!
//! A tile size / overlap pair is valid for a height-field when the tiles
//! cover it evenly: `R = (resolution - overlap - 1) / (size - overlap - 1)`
//! must be a positive integer, and the solver additionally requires odd
//! tile sizes. `resolve` searches for the valid pair nearest to a desired
//! configuration.

/// How many overlap values beyond the desired one the search considers.
const OVERLAP_SEARCH_RANGE: u32 = 5;

/// True if `(size, overlap)` tiles a height-field of `resolution` samples
/// evenly and `size` satisfies the solver's odd-size requirement.
///
/// Pure query, usable by tooling to warn about a configuration before
/// committing to it.
pub fn parameters_are_valid(resolution: u32, size: u32, overlap: u32) -> bool {
    if size <= overlap + 1 || resolution < size {
        return false;
    }
    if size % 2 == 0 {
        return false;
    }
    let field = resolution - overlap - 1;
    let stride = size - overlap - 1;
    field % stride == 0
}

/// Find the valid `(size, overlap)` pair nearest to the desired one.
///
/// Returns the desired pair unchanged when it is already valid. Otherwise
/// overlaps in `[desired_overlap, desired_overlap + 5)` are searched; for
/// each, tile counts are probed outward from the desired ratio
/// (`R0, R0+1, R0-1, R0+2, ...`) until a size that is integral and odd is
/// found, collecting up to two candidates per overlap. The candidate whose
/// ratio is closest to the desired (fractional) ratio wins, ties broken by
/// discovery order.
///
/// `None` means no valid pair exists in the search window; callers should
/// keep the desired values and surface a configuration warning. A tiling
/// that does not evenly divide the field still functions, with edge tiles
/// clipped.
pub fn resolve(resolution: u32, desired_size: u32, desired_overlap: u32) -> Option<(u32, u32)> {
    if parameters_are_valid(resolution, desired_size, desired_overlap) {
        return Some((desired_size, desired_overlap));
    }
    if desired_size <= desired_overlap + 1 || resolution <= desired_overlap + 1 {
        return None;
    }

    let desired_stride = (desired_size - desired_overlap - 1) as i64;
    let desired_ratio = (resolution - desired_overlap - 1) as f32 / desired_stride as f32;

    let mut candidates: Vec<(u32, u32)> = Vec::new();

    for overlap in desired_overlap..desired_overlap + OVERLAP_SEARCH_RANGE {
        if resolution <= overlap + 1 {
            break;
        }
        let field = (resolution - overlap - 1) as i64;
        let r0 = (((field as f32) / desired_stride as f32).round() as i64).max(1);

        if let Some(size) = size_for_ratio(field, r0, overlap) {
            candidates.push((size, overlap));
            continue;
        }

        for diff in 1i64.. {
            let mut added = false;
            if let Some(size) = size_for_ratio(field, r0 + diff, overlap) {
                candidates.push((size, overlap));
                added = true;
            }
            if r0 - diff > 1 {
                if let Some(size) = size_for_ratio(field, r0 - diff, overlap) {
                    candidates.push((size, overlap));
                    added = true;
                }
            }
            if added || (r0 + diff >= field && r0 - diff <= 1) {
                break;
            }
        }
    }

    candidates.into_iter().min_by(|a, b| {
        let score_a = ratio_distance(resolution, a.0, a.1, desired_ratio);
        let score_b = ratio_distance(resolution, b.0, b.1, desired_ratio);
        // total_cmp keeps the first-found candidate on ties
        score_a.total_cmp(&score_b)
    })
}

/// Tile size for a given tile count, if it is integral and odd.
fn size_for_ratio(field: i64, ratio: i64, overlap: u32) -> Option<u32> {
    if ratio < 1 || ratio > field || field % ratio != 0 {
        return None;
    }
    let size = field / ratio + overlap as i64 + 1;
    (size % 2 == 1).then_some(size as u32)
}

fn ratio_distance(resolution: u32, size: u32, overlap: u32, desired_ratio: f32) -> f32 {
    let ratio = (resolution - overlap - 1) as f32 / (size - overlap - 1) as f32;
    (desired_ratio - ratio).abs()
}
