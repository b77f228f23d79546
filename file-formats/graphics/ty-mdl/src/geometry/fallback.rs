//! Pattern-scanning fallback decoder
//!
//! Last resort for streams the structured decoders cannot handle: scan the
//! whole buffer for the DMA marker, attempt one generic fixed-layout read
//! per occurrence and keep whatever validates. Occurrences that fail any
//! bounds or plausibility check are dropped silently; only the total
//! absence of output is an error for the caller.

use crate::blob::{Blob, snorm_byte, unorm_byte};
use crate::error::Result;
use crate::geometry::{CONSOLE_MARKER, DecodeOptions, DecodeReport};
use crate::types::{DecodedMesh, GeometryVertex};

/// Marker opening the packed normal array
const NORMAL_MARKER: [u8; 2] = [0x03, 0x80];

/// Vertex counts above this are treated as a misread
const MAX_VERTICES: u32 = 100_000;

pub(super) fn decode(
    stream_bytes: &[u8],
    options: &DecodeOptions,
    report: &mut DecodeReport,
) -> Result<Vec<DecodedMesh>> {
    let stream = Blob::new(stream_bytes);
    let mut meshes = Vec::new();

    for pos in memchr::memmem::find_iter(stream_bytes, &CONSOLE_MARKER) {
        options.check_cancelled()?;
        match decode_at(&stream, stream_bytes, pos + CONSOLE_MARKER.len()) {
            Some(vertices) => meshes.push(DecodedMesh {
                vertices,
                strip_vertex_counts: None,
                texture_index: 0,
                component_index: 0,
                mesh_constants: None,
            }),
            None => report.strips_abandoned += 1,
        }
    }
    Ok(meshes)
}

fn decode_at(stream: &Blob<'_>, bytes: &[u8], start: usize) -> Option<Vec<GeometryVertex>> {
    let vertex_count = stream.u32_at(start).ok()?;
    if vertex_count == 0 || vertex_count > MAX_VERTICES {
        return None;
    }
    let n = vertex_count as usize;
    // 32 unknown bytes plus a 4-byte tag precede the positions.
    let mut offset = start + 4 + 32 + 4;

    let mut vertices = vec![GeometryVertex::default(); n];
    for (i, v) in vertices.iter_mut().enumerate() {
        let p = offset + i * 12;
        v.position = [
            stream.f32_at(p).ok()?,
            stream.f32_at(p + 4).ok()?,
            stream.f32_at(p + 8).ok()?,
        ];
    }
    offset += n * 12;

    // The normal array starts 4 bytes past its own marker.
    let normal_pos = memchr::memmem::find(bytes.get(offset..)?, &NORMAL_MARKER)? + offset;
    offset = normal_pos + 4;

    for (i, v) in vertices.iter_mut().enumerate() {
        let at = offset + i * 4;
        v.normal = [
            snorm_byte(stream.u8_at(at).ok()?),
            snorm_byte(stream.u8_at(at + 1).ok()?),
            snorm_byte(stream.u8_at(at + 2).ok()?),
        ];
    }
    offset += n * 4;

    offset += 4;
    for (i, v) in vertices.iter_mut().enumerate() {
        let t = offset + i * 8;
        let u = f32::from(stream.i16_at(t).ok()?) / 4096.0;
        let tv = (f32::from(stream.i16_at(t + 2).ok()?) / 4096.0 - 1.0).abs();
        v.texcoord = [u, tv];
    }
    offset += n * 8;

    offset += 4;
    for (i, v) in vertices.iter_mut().enumerate() {
        let c = offset + i * 4;
        v.colour = [
            unorm_byte(stream.u8_at(c).ok()?),
            unorm_byte(stream.u8_at(c + 1).ok()?),
            unorm_byte(stream.u8_at(c + 2).ok()?),
            unorm_byte(stream.u8_at(c + 3).ok()?),
        ];
    }

    Some(vertices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_fixture(positions: &[[f32; 3]]) -> Vec<u8> {
        let n = positions.len();
        let mut out = Vec::new();
        out.extend_from_slice(&[0xEEu8; 16]); // leading junk
        out.extend_from_slice(&CONSOLE_MARKER);
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(n as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 32 + 4]);
        for p in positions {
            for c in p {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        out.extend_from_slice(&NORMAL_MARKER);
        out.extend_from_slice(&[0u8; 2]); // marker padding
        for _ in 0..n {
            out.extend_from_slice(&[127, 0, 0, 0]); // +X normal
        }
        out.extend_from_slice(&[0u8; 4]);
        for _ in 0..n {
            out.extend_from_slice(&2048i16.to_le_bytes()); // u = 0.5
            out.extend_from_slice(&0i16.to_le_bytes()); // v -> 1.0
            out.extend_from_slice(&[0u8; 4]);
        }
        out.extend_from_slice(&[0u8; 4]);
        for _ in 0..n {
            out.extend_from_slice(&[255, 128, 0, 255]);
        }
        out
    }

    #[test]
    fn test_scan_decodes_one_mesh_per_marker() {
        let positions = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let stream = fallback_fixture(&positions);

        let mut report = DecodeReport::default();
        let meshes = decode(&stream, &DecodeOptions::default(), &mut report).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(report.strips_abandoned, 0);

        let v = &meshes[0].vertices;
        assert_eq!(v.len(), 3);
        assert_eq!(v[2].position, [7.0, 8.0, 9.0]);
        assert!((v[0].normal[0] - 1.0).abs() < 1e-6);
        assert!((v[1].texcoord[0] - 0.5).abs() < 1e-6);
        assert!((v[1].texcoord[1] - 1.0).abs() < 1e-6);
        assert!((v[0].colour[1] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vertex_count_occurrence_is_dropped() {
        let mut stream = vec![0u8; 8];
        stream.extend_from_slice(&CONSOLE_MARKER);
        stream.extend_from_slice(&0u32.to_le_bytes());
        stream.extend_from_slice(&[0u8; 64]);

        let mut report = DecodeReport::default();
        let meshes = decode(&stream, &DecodeOptions::default(), &mut report).unwrap();
        assert!(meshes.is_empty());
        assert_eq!(report.strips_abandoned, 1);
    }

    #[test]
    fn test_truncated_occurrence_is_dropped() {
        let positions = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let mut stream = fallback_fixture(&positions);
        stream.truncate(stream.len() - 6);

        let mut report = DecodeReport::default();
        let meshes = decode(&stream, &DecodeOptions::default(), &mut report).unwrap();
        assert!(meshes.is_empty());
        assert_eq!(report.strips_abandoned, 1);
    }
}
