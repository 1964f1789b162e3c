//! Build command implementation
//!
//! Builds an armature from a rig definition and prints its bones with
//! their bind matrices.

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use rigbind_core::{collect_objects, Armature, BindConfig, ConverterCache};
use serde::{Deserialize, Serialize};

use super::loading::{flags_text, load_mesh, load_options, load_pose, load_rig, print_json, report_failure};

/// Arguments of `rigbind build`.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs<'a> {
    pub mesh: &'a str,
    pub rig: &'a str,
    pub preset: Option<&'a str>,
    pub pose: Option<&'a str>,
    pub scale: Option<f64>,
}

/// One bone in the build report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoneSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent: Option<String>,
    pub head: [f64; 3],
    pub tail: [f64; 3],
    pub roll: f64,
    pub flags: String,
    /// Column-major bind matrix.
    pub bind: [f64; 16],
}

/// What `rigbind build` reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildSummary {
    pub name: String,
    pub rig_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub locale: Option<String>,
    pub scale: f64,
    pub weight_groups: usize,
    pub bones: Vec<BoneSummary>,
}

impl BuildSummary {
    pub fn from_armature(amt: &Armature, scale: f64) -> Result<Self> {
        let mut bones = Vec::with_capacity(amt.bones().len());
        for bone in amt.bones().values() {
            bones.push(BoneSummary {
                name: bone.name.clone(),
                parent: bone.parent.clone(),
                head: bone.head.to_array(),
                tail: bone.tail.to_array(),
                roll: bone.roll,
                flags: flags_text(&bone.flags),
                bind: bone.bind_matrix()?.to_cols_array(),
            });
        }
        Ok(Self {
            name: amt.name.clone(),
            rig_type: amt.options.rig_type.clone(),
            locale: amt.locale().map(|l| l.id().to_string()),
            scale,
            weight_groups: amt.vertex_weights().len(),
            bones,
        })
    }
}

/// Loads every input and builds the armature.
///
/// A pose file turns the T-pose on. `scale` overrides the preset's scale.
pub fn build(args: &BuildArgs<'_>) -> Result<BuildSummary> {
    let mesh = load_mesh(args.mesh)?;
    let rig = load_rig(args.rig)?;
    let mut options = load_options(args.preset)?;
    let reference_pose = load_pose(args.pose)?;
    if reference_pose.is_some() {
        options.use_t_pose = true;
    }
    let scale = args.scale.unwrap_or(options.scale);
    let config = BindConfig {
        scale,
        reference_pose,
        ..Default::default()
    };
    let name = if rig.name.is_empty() { "rig" } else { rig.name.as_str() };
    let collected = collect_objects(
        name,
        &mesh,
        &rig,
        options,
        &[],
        &config,
        &ConverterCache::empty(),
    )?;
    BuildSummary::from_armature(&collected.armature, scale)
}

/// Run the build command
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(args: &BuildArgs<'_>, json_output: bool) -> Result<ExitCode> {
    let summary = match build(args) {
        Ok(summary) => summary,
        Err(error) => return Ok(report_failure::<BuildSummary>(&error, json_output)),
    };

    if json_output {
        print_json(summary, Vec::new());
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {} ({})", "Armature:".cyan().bold(), summary.name, summary.rig_type);
    if let Some(locale) = &summary.locale {
        println!("  {} {}", "locale:".dimmed(), locale);
    }
    println!("  {} {}", "scale:".dimmed(), summary.scale);
    for bone in &summary.bones {
        let parent = bone.parent.as_deref().unwrap_or("-");
        println!(
            "  {} {} {}",
            bone.name.bold(),
            format!("<- {}", parent).dimmed(),
            format!("[{}]", bone.flags).dimmed()
        );
        println!(
            "      head ({:.4}, {:.4}, {:.4})  tail ({:.4}, {:.4}, {:.4})  roll {:.4}",
            bone.head[0], bone.head[1], bone.head[2], bone.tail[0], bone.tail[1], bone.tail[2], bone.roll
        );
        for row in 0..4 {
            println!(
                "      | {:>9.4} {:>9.4} {:>9.4} {:>9.4} |",
                bone.bind[row],
                bone.bind[4 + row],
                bone.bind[8 + row],
                bone.bind[12 + row]
            );
        }
    }
    println!(
        "\n{} {} bones, {} weight groups",
        "SUCCESS".green().bold(),
        summary.bones.len(),
        summary.weight_groups
    );
    Ok(ExitCode::SUCCESS)
}
