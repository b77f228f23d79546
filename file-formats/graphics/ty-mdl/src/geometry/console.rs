//! Console geometry stream decoder
//!
//! Console streams interleave mesh records with DMA packets. The object
//! lookup table in the model buffer maps each (texture, component) pair to
//! a chain of mesh records inside the stream; every record owns a run of
//! strips, each opened by the DMA marker and followed by a one-byte vertex
//! count and packed attribute arrays. Texcoords are 4.12 fixed point with
//! the V axis flipped.

use crate::blob::{Blob, snorm_byte, unorm_byte};
use crate::error::Result;
use crate::geometry::{CONSOLE_MARKER, DecodeOptions, DecodeReport};
use crate::header::ExternalMetadata;
use crate::types::{DecodedMesh, GeometryVertex};

/// How far past the previous strip the marker scan reaches
const MARKER_SCAN_LIMIT: usize = 10_000;

/// List index value meaning "no bone remapping"
const NO_ANIM_NODE_LIST: u16 = 0xFFFF;

pub(super) fn decode(
    model_bytes: &[u8],
    stream_bytes: &[u8],
    meta: &ExternalMetadata,
    options: &DecodeOptions,
    report: &mut DecodeReport,
) -> Result<Vec<DecodedMesh>> {
    let model = Blob::new(model_bytes);
    let stream = Blob::new(stream_bytes);
    let anim_node_lists = meta.anim_node_lists(model_bytes);

    let mut meshes = Vec::new();
    for ti in 0..meta.texture_count {
        for ci in 0..meta.component_count {
            options.check_cancelled()?;

            let cell = meta.object_lookup_offset as usize
                + usize::from(ti) * 4 * usize::from(meta.component_count)
                + usize::from(ci) * 4;
            let Ok(mut mesh_ref) = model.i32_at(cell) else {
                continue;
            };

            // Chain of mesh records inside the stream, linked at +0xC.
            // The hop bound guards against pointer cycles in bad data.
            let mut hops = 0;
            while mesh_ref != 0 {
                hops += 1;
                if hops > 10_000 {
                    log::debug!("mesh chain at cell {cell:#x} too long, abandoned");
                    break;
                }
                if mesh_ref < 0 || mesh_ref as usize >= stream.len() {
                    log::debug!("mesh reference {mesh_ref} outside stream, chain abandoned");
                    report.strips_abandoned += 1;
                    break;
                }
                let record = mesh_ref as usize;
                let Ok(strip_count) = stream.u16_at(record + 0x6) else {
                    report.strips_abandoned += 1;
                    break;
                };
                let anim_list_index = stream.u16_at(record + 0x8).unwrap_or(NO_ANIM_NODE_LIST);

                let mut cursor = record + 0xC;
                for si in 0..strip_count {
                    let Some(marker_pos) = find_marker(stream_bytes, cursor) else {
                        log::debug!("marker for strip {si} of record {record:#x} not found");
                        report.strips_abandoned += 1;
                        break;
                    };
                    cursor = marker_pos + CONSOLE_MARKER.len();

                    match decode_strip(
                        &stream,
                        &mut cursor,
                        anim_list_index,
                        &anim_node_lists,
                    ) {
                        Ok(vertices) => meshes.push(DecodedMesh {
                            vertices,
                            strip_vertex_counts: None,
                            texture_index: ti,
                            component_index: ci,
                            mesh_constants: None,
                        }),
                        Err(e) => {
                            log::debug!("strip {si} of record {record:#x} abandoned: {e}");
                            report.strips_abandoned += 1;
                            break;
                        }
                    }
                }

                mesh_ref = stream.i32_at(record + 0xC).unwrap_or(0);
            }
        }
    }
    Ok(meshes)
}

fn find_marker(stream: &[u8], from: usize) -> Option<usize> {
    if from >= stream.len() {
        return None;
    }
    let window = &stream[from..stream.len().min(from + MARKER_SCAN_LIMIT)];
    memchr::memmem::find(window, &CONSOLE_MARKER).map(|p| from + p)
}

/// Decode one strip's packed attribute arrays, advancing `cursor` past
/// everything consumed.
fn decode_strip(
    stream: &Blob<'_>,
    cursor: &mut usize,
    anim_list_index: u16,
    anim_node_lists: &[Vec<u8>],
) -> Result<Vec<GeometryVertex>> {
    let vertex_count = usize::from(stream.u8_at(*cursor)?);
    // 1 count byte, 3 padding, 32 unknown, 0x27 preamble.
    let mut offset = *cursor + 1 + 3 + 32 + 0x27;

    let mut vertices = vec![GeometryVertex::default(); vertex_count];
    for (i, v) in vertices.iter_mut().enumerate() {
        let p = offset + i * 12;
        v.position = [
            stream.f32_at(p)?,
            stream.f32_at(p + 4)?,
            stream.f32_at(p + 8)?,
        ];
    }
    offset += vertex_count * 12;

    offset += 2;
    let selector = stream.u8_at(offset + 1)?;
    offset += 2;

    match selector {
        // Normals without bone bytes, then fixed-point texcoords.
        0x6A => {
            for (i, v) in vertices.iter_mut().enumerate() {
                let n = offset + i * 4;
                v.normal = [
                    snorm_byte(stream.u8_at(n)?),
                    snorm_byte(stream.u8_at(n + 1)?),
                    snorm_byte(stream.u8_at(n + 2)?),
                ];
            }
            offset += vertex_count * 4;
            offset += 4;
            offset += vertex_count % 4;

            for (i, v) in vertices.iter_mut().enumerate() {
                let t = offset + i * 8;
                v.texcoord = read_fixed_texcoord(stream, t)?;
            }
            offset += vertex_count * 8;
        }
        // Texcoords only; normals stay at the +Z default.
        0x65 => {
            for (i, v) in vertices.iter_mut().enumerate() {
                let t = offset + i * 8;
                v.texcoord = read_fixed_texcoord(stream, t)?;
            }
            offset += vertex_count * 8;
        }
        // Skinned layout: bone byte rides the normal array, bone short
        // rides the texcoord array, both remapped through the anim-node
        // list into global bone space.
        _ => {
            for (i, v) in vertices.iter_mut().enumerate() {
                let n = offset + i * 4;
                v.normal = [
                    snorm_byte(stream.u8_at(n)?),
                    snorm_byte(stream.u8_at(n + 1)?),
                    snorm_byte(stream.u8_at(n + 2)?),
                ];
                let bone = u16::from(stream.u8_at(n + 3)?) >> 1;
                v.skin[1] = f32::from(remap_bone(bone, 1, anim_list_index, anim_node_lists));
            }
            offset += vertex_count * 4;
            offset += 4;

            for (i, v) in vertices.iter_mut().enumerate() {
                let t = offset + i * 8;
                v.texcoord = read_fixed_texcoord(stream, t)?;
                let bone = stream.u16_at(t + 6)? >> 2;
                v.skin[2] = f32::from(remap_bone(bone, 2, anim_list_index, anim_node_lists));
            }
            offset += vertex_count * 8;
        }
    }

    offset += 4;
    for (i, v) in vertices.iter_mut().enumerate() {
        let c = offset + i * 4;
        v.colour = [
            unorm_byte(stream.u8_at(c)?),
            unorm_byte(stream.u8_at(c + 1)?),
            unorm_byte(stream.u8_at(c + 2)?),
            unorm_byte(stream.u8_at(c + 3)?),
        ];
    }
    offset += vertex_count * 4;

    *cursor = offset;
    Ok(vertices)
}

fn read_fixed_texcoord(stream: &Blob<'_>, offset: usize) -> Result<[f32; 2]> {
    let u = f32::from(stream.i16_at(offset)?) / 4096.0;
    let v = (f32::from(stream.i16_at(offset + 2)?) / 4096.0 - 1.0).abs();
    Ok([u, v])
}

/// Remap a packed bone index through the record's anim-node list. The
/// shift restores the bit position the index was extracted from.
fn remap_bone(bone: u16, shift: u16, list_index: u16, lists: &[Vec<u8>]) -> u16 {
    if list_index != NO_ANIM_NODE_LIST {
        if let Some(list) = lists.get(usize::from(list_index)) {
            if let Some(&mapped) = list.get(usize::from(bone)) {
                return (u16::from(mapped) + 1) << shift;
            }
        }
    }
    bone << shift
}
