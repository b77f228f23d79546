//! Triangle strip assembly
//!
//! Decoded meshes carry their vertices as back-to-back triangle strips.
//! Some encodings record per-strip vertex counts; those counts rarely add up
//! to the vertex array length exactly because strip boundaries may or may not
//! be padded with duplicated vertices. [`assemble_strips`] reconciles the
//! declared counts against the actual length, or derives strip boundaries
//! from duplicated positions when no counts survive, then emits an indexed
//! triangle list with degenerate triangles filtered out.

use crate::types::{GeometryVertex, TriangleList};

/// Quantisation step used when comparing vertex positions
pub const POSITION_EPSILON: f32 = 1e-5;

/// Assemble triangle strips into an indexed triangle list.
///
/// When `strip_vertex_counts` is present, three hypotheses are tried in
/// order to reconcile the counts with the vertex array length `len`:
///
/// 1. the counts sum to `len` exactly (strips are packed back to back);
/// 2. the counts sum to `len - 2 * (n - 1)` (each boundary carries two
///    duplicated stitching vertices that belong to no strip);
/// 3. the counts sum to `len - (n - 1)` (one stitching vertex per
///    boundary).
///
/// If none holds, or no counts are present, strip boundaries are derived
/// from runs of duplicated positions instead.
pub fn assemble_strips(
    vertices: &[GeometryVertex],
    strip_vertex_counts: Option<&[u16]>,
) -> TriangleList {
    let ranges = strip_vertex_counts
        .and_then(|counts| reconcile_counts(counts, vertices.len()))
        .unwrap_or_else(|| derive_strip_ranges(vertices));

    let mut list = TriangleList::default();
    for range in &ranges {
        append_strip(vertices, range.clone(), &mut list);
    }
    list
}

/// Try the three count-reconciliation hypotheses; return per-strip index
/// ranges on success.
fn reconcile_counts(counts: &[u16], len: usize) -> Option<Vec<std::ops::Range<usize>>> {
    if counts.is_empty() {
        return None;
    }
    let sum: usize = counts.iter().map(|&c| usize::from(c)).sum();
    let boundaries = counts.len() - 1;

    let stitch = if sum == len {
        0
    } else if sum + boundaries * 2 == len {
        2
    } else if sum + boundaries == len {
        1
    } else {
        log::debug!(
            "strip counts sum to {sum} but {len} vertices present, deriving boundaries instead"
        );
        return None;
    };

    let mut ranges = Vec::with_capacity(counts.len());
    let mut cursor = 0usize;
    for &count in counts {
        let count = usize::from(count);
        ranges.push(cursor..cursor + count);
        cursor += count + stitch;
    }
    Some(ranges)
}

/// Derive strip boundaries from the vertex data itself. A strip boundary is
/// marked by two adjacent vertices sharing a quantised position (the
/// stitching duplicates). The duplicate is a real position, so the next
/// strip starts at its second copy rather than after it; a back-to-back
/// double pair therefore starts the next strip at the second vertex of the
/// second pair.
pub fn derive_strip_ranges(vertices: &[GeometryVertex]) -> Vec<std::ops::Range<usize>> {
    let mut ranges = Vec::new();
    if vertices.is_empty() {
        return ranges;
    }

    let mut start = 0usize;
    let mut i = 1usize;
    while i < vertices.len() {
        if same_position(&vertices[i - 1], &vertices[i]) {
            if i > start {
                ranges.push(start..i);
            }
            while i < vertices.len() && same_position(&vertices[i - 1], &vertices[i]) {
                i += 1;
            }
            // The second copy of the duplicate opens the next strip.
            start = i - 1;
        }
        i += 1;
    }
    if start < vertices.len() {
        ranges.push(start..vertices.len());
    }
    ranges
}

/// Emit the triangles of a single strip into `list`, alternating winding
/// and skipping triangles whose vertices collapse onto each other.
fn append_strip(
    vertices: &[GeometryVertex],
    range: std::ops::Range<usize>,
    list: &mut TriangleList,
) {
    if range.end > vertices.len() || range.len() < 3 {
        if range.end > vertices.len() {
            list.strip_breaks += 1;
        }
        return;
    }

    for (tri, i) in (range.start..range.end - 2).enumerate() {
        let (a, b, c) = if tri % 2 == 0 {
            (i, i + 1, i + 2)
        } else {
            (i + 1, i, i + 2)
        };

        if same_position(&vertices[a], &vertices[b])
            || same_position(&vertices[b], &vertices[c])
            || same_position(&vertices[a], &vertices[c])
        {
            list.degenerates_skipped += 1;
            continue;
        }

        list.indices.push(a as u32);
        list.indices.push(b as u32);
        list.indices.push(c as u32);
    }
}

fn same_position(a: &GeometryVertex, b: &GeometryVertex) -> bool {
    quantise(a.position) == quantise(b.position)
}

/// Quantise a position for equality comparison
pub fn quantise(position: [f32; 3]) -> [i64; 3] {
    #[allow(clippy::cast_possible_truncation)]
    position.map(|c| (f64::from(c) / f64::from(POSITION_EPSILON)).round() as i64)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn vertex(x: f32, y: f32, z: f32) -> GeometryVertex {
        GeometryVertex {
            position: [x, y, z],
            ..GeometryVertex::default()
        }
    }

    fn quad() -> Vec<GeometryVertex> {
        vec![
            vertex(1.0, 1.0, 0.0),
            vertex(2.0, 1.0, 0.0),
            vertex(1.0, 2.0, 0.0),
            vertex(2.0, 2.0, 0.0),
        ]
    }

    #[test]
    fn test_exact_counts_single_strip() {
        let list = assemble_strips(&quad(), Some(&[4]));
        assert_eq!(list.triangle_count(), 2);
        assert_eq!(list.degenerates_skipped, 0);
        // Alternating winding: second triangle swaps its leading pair.
        assert_eq!(list.indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test_case(0 ; "counts cover every vertex")]
    #[test_case(1 ; "one stitch vertex per boundary")]
    #[test_case(2 ; "two stitch vertices per boundary")]
    fn test_reconciliation_hypotheses(stitch: usize) {
        // Two 4-vertex strips with `stitch` connector vertices between.
        let mut vertices = quad();
        for s in 0..stitch {
            #[allow(clippy::cast_precision_loss)]
            vertices.push(vertex(9.0 + s as f32, 9.0, 9.0));
        }
        vertices.extend([
            vertex(5.0, 5.0, 0.0),
            vertex(6.0, 5.0, 0.0),
            vertex(5.0, 6.0, 0.0),
            vertex(6.0, 6.0, 0.0),
        ]);
        let list = assemble_strips(&vertices, Some(&[4, 4]));
        assert_eq!(list.triangle_count(), 4);
        assert_eq!(list.degenerates_skipped, 0);
    }

    #[test]
    fn test_irreconcilable_counts_fall_back_to_derivation() {
        // Counts claim 10 vertices but only 4 exist with no duplicates, so
        // the whole array is treated as one strip.
        let list = assemble_strips(&quad(), Some(&[10]));
        assert_eq!(list.triangle_count(), 2);
    }

    #[test]
    fn test_derived_ranges_split_on_duplicate_pairs() {
        let mut vertices = quad();
        // Duplicate pair marks the boundary; its second copy belongs to the
        // next strip.
        vertices.push(vertex(2.0, 2.0, 0.0));
        vertices.extend([
            vertex(5.0, 5.0, 0.0),
            vertex(6.0, 5.0, 0.0),
            vertex(5.0, 6.0, 0.0),
        ]);
        let ranges = derive_strip_ranges(&vertices);
        assert_eq!(ranges, vec![0..4, 4..8]);
        let list = assemble_strips(&vertices, None);
        assert_eq!(list.triangle_count(), 4);
    }

    #[test]
    fn test_derived_seam_keeps_duplicate_vertex_triangle() {
        // Four-vertex strip, stitch duplicate, then three fresh vertices.
        // The duplicate leads the second strip, so both strips emit two
        // triangles.
        let mut vertices = quad();
        vertices.push(vertex(2.0, 2.0, 0.0));
        vertices.extend([
            vertex(5.0, 5.0, 0.0),
            vertex(6.0, 5.0, 0.0),
            vertex(5.0, 6.0, 0.0),
        ]);
        let list = assemble_strips(&vertices, None);
        assert_eq!(list.indices, vec![0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7]);
        assert_eq!(list.degenerates_skipped, 0);
    }

    #[test]
    fn test_double_duplicate_pair_starts_strip_at_second_pair() {
        // A B B C C D E F: the fragments before the second pair are too
        // short to emit, and [C D E F] yields two triangles.
        let vertices = vec![
            vertex(0.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0),
            vertex(2.0, 0.0, 1.0),
            vertex(2.0, 0.0, 1.0),
            vertex(3.0, 1.0, 0.0),
            vertex(3.0, 0.0, 2.0),
            vertex(4.0, 1.0, 1.0),
        ];
        let ranges = derive_strip_ranges(&vertices);
        assert_eq!(ranges, vec![0..2, 2..4, 4..8]);
        let list = assemble_strips(&vertices, None);
        assert_eq!(list.triangle_count(), 2);
        assert_eq!(list.indices, vec![4, 5, 6, 6, 5, 7]);
    }

    #[test]
    fn test_degenerate_triangles_are_skipped_and_counted() {
        let vertices = vec![
            vertex(0.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0),
            vertex(2.0, 0.0, 0.0),
        ];
        // Force single-strip treatment so the duplicate lands mid-strip.
        let list = assemble_strips(&vertices, Some(&[4]));
        assert_eq!(list.triangle_count(), 0);
        assert_eq!(list.degenerates_skipped, 2);
        assert_eq!(list.triangles_considered(), 2);
    }

    #[test]
    fn test_short_strip_emits_nothing() {
        let vertices = vec![vertex(0.0, 0.0, 0.0), vertex(1.0, 0.0, 0.0)];
        let list = assemble_strips(&vertices, Some(&[2]));
        assert_eq!(list.triangle_count(), 0);
    }

    #[test]
    fn test_positions_within_epsilon_compare_equal() {
        let a = vertex(1.0, 1.0, 1.0);
        let b = vertex(1.0 + POSITION_EPSILON / 4.0, 1.0, 1.0);
        assert!(same_position(&a, &b));
    }
}
