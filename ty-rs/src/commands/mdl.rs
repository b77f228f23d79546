//! MDL model command implementations

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use std::fs;
use ty_mdl::{DecodeOptions, Model, ModelHeader, UvShiftMode, parse_model_header};

use crate::utils::format_bytes;

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum UvShiftArg {
    #[default]
    Auto,
    Never,
    Always,
}

impl From<UvShiftArg> for UvShiftMode {
    fn from(arg: UvShiftArg) -> Self {
        match arg {
            UvShiftArg::Auto => UvShiftMode::Auto,
            UvShiftArg::Never => UvShiftMode::Never,
            UvShiftArg::Always => UvShiftMode::Always,
        }
    }
}

#[derive(Subcommand)]
pub enum MdlCommands {
    /// Show information about a model header
    Info {
        /// Path to the MDL file
        file: String,

        /// Show texture and component tables
        #[arg(short, long)]
        detailed: bool,
    },

    /// Decode a model and its geometry stream, printing mesh statistics
    Decode {
        /// Path to the MDL file
        file: String,

        /// Path to the MDG geometry stream (omit for header-only models)
        #[arg(short, long)]
        geometry: Option<String>,

        /// Desktop texcoord alignment policy
        #[arg(long, value_enum, default_value_t = UvShiftArg::Auto)]
        uv_shift: UvShiftArg,
    },
}

pub fn execute(command: MdlCommands) -> Result<()> {
    match command {
        MdlCommands::Info { file, detailed } => info(&file, detailed),
        MdlCommands::Decode {
            file,
            geometry,
            uv_shift,
        } => decode(&file, geometry.as_deref(), uv_shift.into()),
    }
}

fn info(path: &str, detailed: bool) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read model: {path}"))?;
    let header =
        parse_model_header(&bytes).with_context(|| format!("Failed to parse header: {path}"))?;

    println!("Model:  {path} ({})", format_bytes(bytes.len() as u64));
    let name = header.name();
    if !name.is_empty() {
        println!("Name:   {name}");
    }
    let bounds = header.bounds();
    println!(
        "Bounds: corner ({:.2}, {:.2}, {:.2}) size ({:.2}, {:.2}, {:.2})",
        bounds.corner.x, bounds.corner.y, bounds.corner.z,
        bounds.size.x, bounds.size.y, bounds.size.z,
    );

    let colliders = ty_mdl::header::parse_colliders(&bytes);
    let bones = ty_mdl::header::parse_bones(&bytes);
    println!("Colliders: {}  Bones: {}", colliders.len(), bones.len());

    match header {
        ModelHeader::InlineGeometry(model) => {
            println!("Generation: legacy (inline geometry)");
            println!("Subobjects: {}", model.subobjects.len());
            if detailed {
                for (i, subobject) in model.subobjects.iter().enumerate() {
                    println!(
                        "  [{i}] {} material={} meshes={} triangles={}",
                        subobject.name,
                        subobject.material,
                        subobject.meshes.len(),
                        subobject.triangle_count,
                    );
                }
            }
        }
        ModelHeader::ExternalGeometry(meta) => {
            println!("Generation: current (external geometry stream)");
            println!(
                "Components: {}  Textures: {}  AnimNodes: {}  RefPoints: {}",
                meta.component_count,
                meta.texture_count,
                meta.anim_node_count,
                meta.ref_point_count,
            );
            if detailed {
                for (i, texture) in meta.texture_names.iter().enumerate() {
                    println!("  texture [{i}] {texture}");
                }
                for (i, component) in meta.components.iter().enumerate() {
                    println!("  component [{i}] {}", component.name);
                }
            }
        }
    }
    Ok(())
}

fn decode(path: &str, geometry: Option<&str>, uv_shift: UvShiftMode) -> Result<()> {
    let model_bytes = fs::read(path).with_context(|| format!("Failed to read model: {path}"))?;
    let stream_bytes = geometry
        .map(|g| fs::read(g).with_context(|| format!("Failed to read geometry stream: {g}")))
        .transpose()?;

    let options = DecodeOptions {
        uv_shift,
        ..DecodeOptions::default()
    };
    let model = Model::parse(&model_bytes, stream_bytes.as_deref(), &options)
        .with_context(|| format!("Failed to decode model: {path}"))?;

    if !model.name.is_empty() {
        println!("Name: {}", model.name);
    }
    if let Some(encoding) = model.report.encoding {
        println!(
            "Encoding: {encoding}{}",
            if model.report.fallback_used {
                " (fallback pass)"
            } else {
                ""
            }
        );
    }

    let mut vertices = 0usize;
    let mut triangles = 0usize;
    for (i, mesh) in model.meshes.iter().enumerate() {
        println!(
            "  mesh [{i}] material={} vertices={} triangles={}",
            mesh.material,
            mesh.vertices.len(),
            mesh.triangle_count(),
        );
        vertices += mesh.vertices.len();
        triangles += mesh.triangle_count();
    }

    println!(
        "{} mesh(es), {vertices} vertices, {triangles} triangles",
        model.meshes.len()
    );
    if model.report.degenerates_skipped > 0 || model.report.strip_breaks > 0 {
        println!(
            "Filtered {} connector triangle(s), {} broken strip(s)",
            model.report.degenerates_skipped, model.report.strip_breaks
        );
    }
    if model.report.box_like_rejected > 0 {
        println!(
            "Rejected {} box-outline mesh(es)",
            model.report.box_like_rejected
        );
    }
    Ok(())
}
