//! Bind command implementation
//!
//! Builds the armature, then binds proxy files to it and reports what each
//! received.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use rigbind_core::{collect_objects, BindConfig, BoundProxy, ProxyType};
use serde::{Deserialize, Serialize};

use super::json_output::{parse_warning_to_json, JsonWarning};
use super::loading::{
    converter_cache, load_mesh, load_options, load_pose, load_proxy, load_rig, parse_proxy_type,
    print_json, report_failure,
};

/// Arguments of `rigbind bind`.
#[derive(Debug, Clone, Default)]
pub struct BindArgs<'a> {
    pub mesh: &'a str,
    pub rig: &'a str,
    pub files: &'a [String],
    pub proxy_type: Option<&'a str>,
    pub converter: Option<&'a str>,
    pub preset: Option<&'a str>,
    pub pose: Option<&'a str>,
    pub scale: Option<f64>,
}

/// One bound mesh in the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundSummary {
    pub name: String,
    pub uuid: String,
    pub proxy_type: ProxyType,
    pub vertex_count: usize,
    pub weight_groups: usize,
    pub weighted_vertices: usize,
    pub shapes: usize,
}

impl From<&BoundProxy> for BoundSummary {
    fn from(bound: &BoundProxy) -> Self {
        let mut weighted: Vec<usize> = bound
            .weights
            .values()
            .flat_map(|g| g.entries().iter().map(|&(v, _)| v))
            .collect();
        weighted.sort_unstable();
        weighted.dedup();
        Self {
            name: bound.name.clone(),
            uuid: bound.uuid.clone(),
            proxy_type: bound.proxy_type,
            vertex_count: bound.coords.len(),
            weight_groups: bound.weights.len(),
            weighted_vertices: weighted.len(),
            shapes: bound.shapes.len(),
        }
    }
}

/// What `rigbind bind` reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindSummary {
    pub armature: String,
    pub bone_count: usize,
    /// Vertices left on the base mesh, absent when a full-body proxy replaced it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body_vertices: Option<usize>,
    pub deleted_count: usize,
    pub proxies: Vec<BoundSummary>,
}

/// Type of one proxy file: `.proxy` files are full-body proxies.
fn file_type(file: &str, default: ProxyType) -> ProxyType {
    let is_proxy = Path::new(file)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("proxy"));
    if is_proxy {
        ProxyType::Proxy
    } else {
        default
    }
}

/// Loads every input and runs the bind pipeline.
pub fn bind(args: &BindArgs<'_>) -> Result<(BindSummary, Vec<JsonWarning>)> {
    let default_type = parse_proxy_type(args.proxy_type)?;
    let mesh = load_mesh(args.mesh)?;
    let rig = load_rig(args.rig)?;
    let mut options = load_options(args.preset)?;
    let reference_pose = load_pose(args.pose)?;
    if reference_pose.is_some() {
        options.use_t_pose = true;
    }
    let converters = converter_cache(args.converter);

    let mut proxies = Vec::with_capacity(args.files.len());
    let mut warnings = Vec::new();
    for file in args.files {
        let load = load_proxy(&mesh, file, file_type(file, default_type), &converters)?;
        warnings.extend(load.warnings.iter().map(|w| parse_warning_to_json(w, file)));
        proxies.push(load.proxy);
    }

    let config = BindConfig {
        scale: args.scale.unwrap_or(options.scale),
        reference_pose,
        ..Default::default()
    };
    let name = if rig.name.is_empty() { "rig" } else { rig.name.as_str() };
    let collected = collect_objects(name, &mesh, &rig, options, &proxies, &config, &converters)?;

    let summary = BindSummary {
        armature: collected.armature.name.clone(),
        bone_count: collected.armature.bones().len(),
        body_vertices: collected.body.as_ref().map(|b| b.coords.len()),
        deleted_count: collected.delete_verts.iter().filter(|&&d| d).count(),
        proxies: collected.proxies.iter().map(BoundSummary::from).collect(),
    };
    Ok((summary, warnings))
}

/// Run the bind command
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(args: &BindArgs<'_>, json_output: bool) -> Result<ExitCode> {
    let (summary, warnings) = match bind(args) {
        Ok(done) => done,
        Err(error) => return Ok(report_failure::<BindSummary>(&error, json_output)),
    };

    if json_output {
        print_json(summary, warnings);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} {} ({} bones)",
        "Armature:".cyan().bold(),
        summary.armature,
        summary.bone_count
    );
    match summary.body_vertices {
        Some(count) => println!(
            "  {} {} vertices ({} deleted)",
            "body:".dimmed(),
            count,
            summary.deleted_count
        ),
        None => println!("  {} replaced by full-body proxy", "body:".dimmed()),
    }
    for proxy in &summary.proxies {
        println!(
            "  {} {} {}",
            proxy.name.bold(),
            format!("[{}]", proxy.proxy_type).dimmed(),
            proxy.uuid.dimmed()
        );
        println!(
            "      {} vertices, {} weighted, {} weight groups, {} shapes",
            proxy.vertex_count, proxy.weighted_vertices, proxy.weight_groups, proxy.shapes
        );
    }
    println!(
        "\n{} {} proxies bound",
        "SUCCESS".green().bold(),
        summary.proxies.len()
    );
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert_eq!(file_type("low.proxy", ProxyType::Clothes), ProxyType::Proxy);
        assert_eq!(file_type("LOW.PROXY", ProxyType::Hair), ProxyType::Proxy);
        assert_eq!(file_type("bob.mhclo", ProxyType::Hair), ProxyType::Hair);
    }
}
