//! Proxy command implementation
//!
//! Parses one proxy file against a base mesh and summarizes it.

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use rigbind_core::{ParseWarning, ProxyType};
use serde::{Deserialize, Serialize};

use super::json_output::parse_warning_to_json;
use super::loading::{converter_cache, load_mesh, load_proxy, parse_proxy_type, print_json, report_failure};

/// What `rigbind proxy` reports about a proxy file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxySummary {
    pub name: String,
    pub uuid: String,
    pub proxy_type: ProxyType,
    pub basemesh: String,
    pub vertex_count: usize,
    pub deleted_count: usize,
    pub scale: [f64; 3],
    pub z_depth: i32,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub material: Option<String>,
    /// Weight groups declared by the proxy itself.
    pub weight_groups: usize,
    /// BLAKE3 hash of the proxy source
    pub source_hash: String,
}

/// Loads the mesh and proxy and builds the summary.
pub fn summarize(
    mesh_path: &str,
    file: &str,
    proxy_type: Option<&str>,
    converter: Option<&str>,
) -> Result<(ProxySummary, Vec<ParseWarning>)> {
    let proxy_type = parse_proxy_type(proxy_type)?;
    let mesh = load_mesh(mesh_path)?;
    let converters = converter_cache(converter);
    let load = load_proxy(&mesh, file, proxy_type, &converters)?;
    let proxy = &load.proxy;

    let summary = ProxySummary {
        name: proxy.name.clone(),
        uuid: proxy.uuid().to_string(),
        proxy_type: proxy.proxy_type,
        basemesh: proxy.basemesh.clone(),
        vertex_count: proxy.vertex_count(),
        deleted_count: proxy.deleted_vertices().len(),
        scale: proxy.scale.to_array(),
        z_depth: proxy.z_depth,
        tags: proxy.tags.clone(),
        material: proxy
            .material_file
            .as_ref()
            .map(|p| p.display().to_string()),
        weight_groups: proxy.weights.as_ref().map_or(0, |w| w.len()),
        source_hash: load.source_hash.clone(),
    };
    Ok((summary, load.warnings))
}

/// Run the proxy command
///
/// # Returns
/// Exit code: 0 on success, 1 on error
pub fn run(
    mesh_path: &str,
    file: &str,
    proxy_type: Option<&str>,
    converter: Option<&str>,
    json_output: bool,
) -> Result<ExitCode> {
    let (summary, warnings) = match summarize(mesh_path, file, proxy_type, converter) {
        Ok(done) => done,
        Err(error) => return Ok(report_failure::<ProxySummary>(&error, json_output)),
    };

    if json_output {
        let warnings = warnings
            .iter()
            .map(|w| parse_warning_to_json(w, file))
            .collect();
        print_json(summary, warnings);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {}", "Proxy:".cyan().bold(), file);
    println!("  {} {} ({})", "name:".dimmed(), summary.name, summary.proxy_type);
    println!("  {} {}", "uuid:".dimmed(), summary.uuid);
    println!("  {} {}", "basemesh:".dimmed(), summary.basemesh);
    println!("  {} {}", "vertices:".dimmed(), summary.vertex_count);
    println!("  {} {}", "deleted base vertices:".dimmed(), summary.deleted_count);
    println!(
        "  {} {:.4} {:.4} {:.4}",
        "scale:".dimmed(),
        summary.scale[0],
        summary.scale[1],
        summary.scale[2]
    );
    if !summary.tags.is_empty() {
        println!("  {} {}", "tags:".dimmed(), summary.tags.join(", "));
    }
    if summary.weight_groups > 0 {
        println!("  {} {}", "own weight groups:".dimmed(), summary.weight_groups);
    }
    println!("  {} {}", "source:".dimmed(), &summary.source_hash[..16]);
    if warnings.is_empty() {
        println!("\n{} proxy parsed", "SUCCESS".green().bold());
    } else {
        println!(
            "\n{} proxy parsed with {} warning(s)",
            "SUCCESS".green().bold(),
            warnings.len()
        );
    }
    Ok(ExitCode::SUCCESS)
}
