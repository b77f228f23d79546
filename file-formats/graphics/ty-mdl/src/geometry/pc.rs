//! Desktop geometry stream decoder
//!
//! Desktop streams store mesh headers first and one contiguous block of
//! 48-byte vertices after them. Nothing in the header points at the block,
//! so it is located by scanning for a run of plausible vertices. Mesh
//! headers are frequently shared between several lookup-table cells while
//! their vertex data is stored once, so vertex data is consumed by a single
//! cursor over unique headers in first-seen order and the decoded meshes
//! are then emitted per cell from that cache.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::blob::Blob;
use crate::error::{MdlError, Result};
use crate::geometry::{DecodeOptions, DecodeReport, UvShiftMode};
use crate::header::ExternalMetadata;
use crate::types::{DecodedMesh, GeometryVertex};

/// Bytes per desktop vertex: flag u32, texcoord 2f, position 3f,
/// weight f, two constants 2f, normal 3f
pub const VERTEX_STRIDE: usize = 48;

/// Valid vertices required to accept a candidate block start
const LOCATE_QUORUM: usize = 4;

/// Vertices examined per candidate
const LOCATE_WINDOW: usize = 5;

struct ParsedMesh {
    vertices: Vec<GeometryVertex>,
    strip_vertex_counts: Option<Vec<u16>>,
    mesh_constants: Option<[f32; 2]>,
    renderable: bool,
}

pub(super) fn decode(
    model_bytes: &[u8],
    stream_bytes: &[u8],
    meta: &ExternalMetadata,
    options: &DecodeOptions,
    report: &mut DecodeReport,
) -> Result<Vec<DecodedMesh>> {
    let stream = Blob::new(stream_bytes);

    // Pass 1: walk every lookup cell chain once to find where the headers
    // end and to fix the unique-header order.
    let mut header_end = 0usize;
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for_each_chain(model_bytes, stream_bytes, meta, |record| {
        if seen.insert(record) {
            order.push(record);
            if let Ok(strip_count) = stream.u16_at(record + 0x6) {
                header_end = header_end.max(record + 0x10 + usize::from(strip_count) * 2);
            }
        }
    });

    if order.is_empty() {
        log::debug!("lookup table produced no mesh references");
        return Ok(Vec::new());
    }

    let Some((block_start, confidence)) = locate_vertex_block(stream_bytes, header_end) else {
        return Err(MdlError::ambiguous("no plausible vertex block found"));
    };
    log::debug!("vertex block at {block_start:#x} (confidence {confidence:.2})");

    // Pass 2: parse each unique header once, consuming the block in order.
    let mut parsed: HashMap<usize, ParsedMesh> = HashMap::with_capacity(order.len());
    let mut cursor = block_start;
    for &record in &order {
        options.check_cancelled()?;

        let base = stream.u16_at(record)?;
        let duplicate = stream.u16_at(record + 0x4)?;
        let strip_count = stream.u16_at(record + 0x6)?;
        if strip_count > 1000 {
            return Err(MdlError::ambiguous(format!(
                "strip count {strip_count} at record {record:#x} implausible"
            )));
        }

        let total = usize::from(base) + usize::from(duplicate);
        if total == 0 {
            parsed.insert(
                record,
                ParsedMesh {
                    vertices: Vec::new(),
                    strip_vertex_counts: None,
                    mesh_constants: None,
                    renderable: false,
                },
            );
            continue;
        }

        // Shared cursor: the block stores every unique mesh back to back,
        // so a shortfall here desyncs everything after it.
        stream.bytes_at(cursor, total * VERTEX_STRIDE).map_err(|_| {
            MdlError::ambiguous(format!(
                "vertex block exhausted at record {record:#x} ({total} vertices wanted)"
            ))
        })?;

        let mesh = parse_mesh(&stream, record, cursor, total, strip_count, options)?;
        if !mesh.renderable {
            report.box_like_rejected += 1;
        }
        parsed.insert(record, mesh);
        cursor += total * VERTEX_STRIDE;
    }

    // Pass 3: emit one mesh per lookup cell reference from the cache.
    let mut meshes = Vec::new();
    for ti in 0..meta.texture_count {
        let collision = meta
            .texture_names
            .get(usize::from(ti))
            .is_some_and(|n| n.len() >= 3 && n[..3].eq_ignore_ascii_case("cm_"));

        for ci in 0..meta.component_count {
            for_each_in_chain(model_bytes, stream_bytes, meta, ti, ci, |record| {
                if collision {
                    return;
                }
                let Some(p) = parsed.get(&record) else {
                    return;
                };
                if !p.renderable {
                    return;
                }
                meshes.push(DecodedMesh {
                    vertices: p.vertices.clone(),
                    strip_vertex_counts: p.strip_vertex_counts.clone(),
                    texture_index: ti,
                    component_index: ci,
                    mesh_constants: p.mesh_constants,
                });
            });
        }
    }
    Ok(meshes)
}

/// Walk the lookup-table chain of every (texture, component) cell
fn for_each_chain(
    model_bytes: &[u8],
    stream_bytes: &[u8],
    meta: &ExternalMetadata,
    mut f: impl FnMut(usize),
) {
    for ti in 0..meta.texture_count {
        for ci in 0..meta.component_count {
            for_each_in_chain(model_bytes, stream_bytes, meta, ti, ci, &mut f);
        }
    }
}

fn for_each_in_chain(
    model_bytes: &[u8],
    stream_bytes: &[u8],
    meta: &ExternalMetadata,
    ti: u16,
    ci: u16,
    mut f: impl FnMut(usize),
) {
    let model = Blob::new(model_bytes);
    let stream = Blob::new(stream_bytes);
    let cell = meta.object_lookup_offset as usize
        + usize::from(ti) * 4 * usize::from(meta.component_count)
        + usize::from(ci) * 4;
    let Ok(mut mesh_ref) = model.i32_at(cell) else {
        return;
    };
    let mut hops = 0;
    while mesh_ref > 0 && (mesh_ref as usize) < stream.len() {
        // Chains in the wild are short; a bound guards against cycles.
        hops += 1;
        if hops > 10_000 {
            break;
        }
        let record = mesh_ref as usize;
        f(record);
        mesh_ref = stream.i32_at(record + 0xC).unwrap_or(0);
    }
}

/// Find the start of the contiguous vertex block by scanning 4-byte
/// aligned offsets from `after` for a run of plausible vertices. Returns
/// the offset and the fraction of examined vertices that validated.
pub fn locate_vertex_block(stream: &[u8], after: usize) -> Option<(usize, f32)> {
    let blob = Blob::new(stream);
    let mut offset = after & !0x3;
    while offset + LOCATE_QUORUM * VERTEX_STRIDE <= stream.len() {
        let mut checked = 0usize;
        let mut valid = 0usize;
        for v in 0..LOCATE_WINDOW {
            let at = offset + v * VERTEX_STRIDE;
            if at + VERTEX_STRIDE > stream.len() {
                break;
            }
            checked += 1;
            if plausible_vertex(&blob, at) {
                valid += 1;
            }
        }
        if valid >= LOCATE_QUORUM {
            #[allow(clippy::cast_precision_loss)]
            return Some((offset, valid as f32 / checked as f32));
        }
        offset += 4;
    }
    None
}

/// Position finite, within a sane world range and not all-zero; normal
/// finite with a roughly unit length.
fn plausible_vertex(blob: &Blob<'_>, at: usize) -> bool {
    let Ok(pos) = read_f32x3(blob, at + 12) else {
        return false;
    };
    let Ok(normal) = read_f32x3(blob, at + 36) else {
        return false;
    };

    let pos_valid = pos.iter().all(|c| c.is_finite() && c.abs() < 1000.0);
    let non_zero = pos.iter().any(|c| c.abs() > 0.0001);
    let len = normal
        .iter()
        .map(|c| c * c)
        .sum::<f32>()
        .sqrt();
    let normal_valid = normal.iter().all(|c| c.is_finite()) && len > 0.2 && len < 1.8;

    pos_valid && non_zero && normal_valid
}

fn read_f32x3(blob: &Blob<'_>, at: usize) -> Result<[f32; 3]> {
    Ok([blob.f32_at(at)?, blob.f32_at(at + 4)?, blob.f32_at(at + 8)?])
}

fn parse_mesh(
    stream: &Blob<'_>,
    record: usize,
    block: usize,
    total: usize,
    strip_count: u16,
    options: &DecodeOptions,
) -> Result<ParsedMesh> {
    let mut vertices = vec![GeometryVertex::default(); total];
    let mut raw_uvs = vec![[0.0f32; 2]; total];

    for (i, v) in vertices.iter_mut().enumerate() {
        let at = block + i * VERTEX_STRIDE;
        raw_uvs[i] = [stream.f32_at(at + 4)?, 1.0 - stream.f32_at(at + 8)?];
        v.position = read_f32x3(stream, at + 12)?;
        v.skin[0] = stream.f32_at(at + 24)?;
        v.normal = read_f32x3(stream, at + 36)?;
    }

    let mesh_constants = if total > 0 {
        Some([stream.f32_at(block + 28)?, stream.f32_at(block + 32)?])
    } else {
        None
    };

    let shift = match options.uv_shift {
        UvShiftMode::Never => false,
        UvShiftMode::Always => true,
        UvShiftMode::Auto => vote_uv_shift(&vertices, &raw_uvs),
    };
    for (i, v) in vertices.iter_mut().enumerate() {
        let uv_index = if shift && i + 1 < total { i + 1 } else { i };
        v.texcoord = raw_uvs[uv_index];
    }

    let strip_vertex_counts = read_strip_descriptors(stream, record, strip_count);

    Ok(ParsedMesh {
        renderable: is_renderable(&vertices),
        vertices,
        strip_vertex_counts,
        mesh_constants,
    })
}

/// Strip descriptor low bytes at +0x10; absent or unreadable descriptors
/// yield `None` and boundaries get derived from the data instead.
fn read_strip_descriptors(
    stream: &Blob<'_>,
    record: usize,
    strip_count: u16,
) -> Option<Vec<u16>> {
    if strip_count == 0 {
        return None;
    }
    let mut counts = Vec::with_capacity(usize::from(strip_count));
    for si in 0..usize::from(strip_count) {
        let descriptor = stream.u16_at(record + 0x10 + si * 2).ok()?;
        counts.push(descriptor & 0xFF);
    }
    Some(counts)
}

/// Decide texcoord alignment from the stitch duplicates: adjacent vertices
/// with equal positions should have equal texcoords, so count which
/// alignment makes that hold more often.
fn vote_uv_shift(vertices: &[GeometryVertex], raw_uvs: &[[f32; 2]]) -> bool {
    const EPS: f32 = 1e-5;
    let same =
        |a: &[f32], b: &[f32]| a.iter().zip(b).all(|(x, y)| (x - y).abs() < EPS);

    let mut pairs = 0usize;
    let mut unshifted = 0usize;
    let mut shifted = 0usize;
    for i in 0..vertices.len().saturating_sub(1) {
        if !same(&vertices[i].position, &vertices[i + 1].position) {
            continue;
        }
        pairs += 1;
        if same(&raw_uvs[i], &raw_uvs[i + 1]) {
            unshifted += 1;
        }
        if i + 2 < vertices.len() && same(&raw_uvs[i + 1], &raw_uvs[i + 2]) {
            shifted += 1;
        }
    }
    pairs > 0 && shifted > unshifted
}

/// A mesh is renderable when it has at least 3 vertices, at least 3 of
/// them off the origin, and is not a box outline. Boxes quantize to at
/// most 8 unique positions with at most two distinct values per axis and
/// are bounds visualizations rather than geometry.
fn is_renderable(vertices: &[GeometryVertex]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let non_zero = vertices
        .iter()
        .filter(|v| v.position.iter().any(|c| c.abs() > 0.0001))
        .count();
    if non_zero < 3 {
        return false;
    }

    let mut unique = BTreeSet::new();
    let mut axis: [BTreeSet<i64>; 3] = Default::default();
    for v in vertices {
        let q = crate::strip::quantise(v.position);
        for (set, c) in axis.iter_mut().zip(q) {
            set.insert(c);
        }
        unique.insert(q);
    }
    let box_like = unique.len() <= 8 && axis.iter().all(|set| set.len() <= 2);
    !box_like
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_vertex(out: &mut Vec<u8>, uv: [f32; 2], pos: [f32; 3], normal: [f32; 3]) {
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        for c in uv {
            out.extend_from_slice(&c.to_le_bytes());
        }
        for c in pos {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out.extend_from_slice(&0.0f32.to_le_bytes()); // weight
        out.extend_from_slice(&27.0f32.to_le_bytes());
        out.extend_from_slice(&27.0f32.to_le_bytes());
        for c in normal {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }

    fn block_of(positions: &[[f32; 3]]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in positions {
            push_vertex(&mut out, [0.5, 0.5], *p, [0.0, 0.0, 1.0]);
        }
        out
    }

    #[test]
    fn test_locate_block_after_header_junk() {
        let mut stream = vec![0u8; 64];
        let positions = [
            [1.0, 1.0, 0.0],
            [2.0, 1.0, 0.0],
            [1.5, 2.0, 0.0],
            [2.5, 2.0, 0.0],
        ];
        stream.extend_from_slice(&block_of(&positions));

        let (start, confidence) = locate_vertex_block(&stream, 0).unwrap();
        assert_eq!(start, 64);
        assert!(confidence >= 0.99);
    }

    #[test]
    fn test_locate_rejects_garbage() {
        let stream = vec![0u8; 1024];
        assert!(locate_vertex_block(&stream, 0).is_none());
    }

    #[test]
    fn test_locate_rejects_out_of_range_positions() {
        // Positions beyond the 1000-unit world bound never validate, at
        // any alignment.
        let mut stream = Vec::new();
        for _ in 0..6 {
            stream.extend_from_slice(&[0u8; 12]); // flag + texcoord
            for _ in 0..3 {
                stream.extend_from_slice(&2000.0f32.to_le_bytes());
            }
            stream.extend_from_slice(&[0u8; 12]); // weight + constants
            stream.extend_from_slice(&0.0f32.to_le_bytes());
            stream.extend_from_slice(&0.0f32.to_le_bytes());
            stream.extend_from_slice(&1.0f32.to_le_bytes());
        }
        assert!(locate_vertex_block(&stream, 0).is_none());
    }

    #[test]
    fn test_uv_shift_vote() {
        let vertex = |pos: [f32; 3]| GeometryVertex {
            position: pos,
            ..GeometryVertex::default()
        };
        // Duplicate pair at 1/2 whose texcoords only match under the +1
        // alignment (uv[1] pairs with uv[2]).
        let vertices = vec![
            vertex([0.0, 0.0, 0.0]),
            vertex([1.0, 0.0, 0.0]),
            vertex([1.0, 0.0, 0.0]),
            vertex([2.0, 0.0, 0.0]),
        ];
        let raw_uvs = vec![[0.0, 0.0], [0.3, 0.3], [0.6, 0.6], [0.6, 0.6]];
        assert!(vote_uv_shift(&vertices, &raw_uvs));

        let aligned_uvs = vec![[0.0, 0.0], [0.5, 0.5], [0.5, 0.5], [0.9, 0.9]];
        assert!(!vote_uv_shift(&vertices, &aligned_uvs));
    }

    #[test]
    fn test_box_outline_is_not_renderable() {
        let corners: Vec<GeometryVertex> = (0u16..8)
            .map(|i| GeometryVertex {
                position: [
                    f32::from(i & 1),
                    f32::from((i >> 1) & 1),
                    f32::from((i >> 2) & 1),
                ],
                ..GeometryVertex::default()
            })
            .collect();
        assert!(!is_renderable(&corners));

        let skewed: Vec<GeometryVertex> = [
            [1.0, 1.0, 0.0],
            [2.0, 1.0, 0.0],
            [1.5, 2.0, 0.0],
            [2.5, 2.0, 0.0],
        ]
        .iter()
        .map(|p| GeometryVertex {
            position: *p,
            ..GeometryVertex::default()
        })
        .collect();
        assert!(is_renderable(&skewed));
    }
}
