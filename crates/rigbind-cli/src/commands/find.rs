//! Find command implementation
//!
//! Searches a directory tree for proxy files by uuid.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use rigbind_core::proxy::scan_uuid;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::json_output::error_codes;
use super::loading::{print_json, report_failure, UsageError};

/// Directory levels searched below the root.
pub const MAX_SEARCH_DEPTH: usize = 6;

/// File extensions treated as proxy files.
pub const PROXY_EXTENSIONS: &[&str] = &["mhclo", "proxy"];

/// What `rigbind find` reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindResult {
    pub uuid: String,
    pub matches: Vec<String>,
}

fn is_proxy_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PROXY_EXTENSIONS.iter().any(|p| p.eq_ignore_ascii_case(e)))
}

/// Proxy files under `root` whose uuid is `uuid`, in sorted path order.
///
/// Unreadable files are skipped.
pub fn find_proxies(root: &Path, uuid: &str) -> Vec<PathBuf> {
    let mut matches = Vec::new();
    for entry in WalkDir::new(root)
        .max_depth(MAX_SEARCH_DEPTH)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_proxy_file(path) {
            continue;
        }
        match scan_uuid(path) {
            Ok(Some(found)) if found == uuid => matches.push(path.to_path_buf()),
            Ok(_) => {}
            Err(e) => log::debug!("skipping {}: {}", path.display(), e),
        }
    }
    matches
}

/// Run the find command
///
/// # Returns
/// Exit code: 0 if at least one proxy matched, 1 otherwise
pub fn run(dir: &str, uuid: &str, json_output: bool) -> Result<ExitCode> {
    let root = Path::new(dir);
    if !root.is_dir() {
        let error = UsageError::new(error_codes::FILE_READ, format!("not a directory: {}", dir));
        return Ok(report_failure::<FindResult>(&anyhow::Error::new(error), json_output));
    }

    let matches = find_proxies(root, uuid);
    if matches.is_empty() {
        let error = UsageError::new(
            error_codes::NOT_FOUND,
            format!("no proxy with uuid '{}' under {}", uuid, dir),
        );
        return Ok(report_failure::<FindResult>(&anyhow::Error::new(error), json_output));
    }

    let result = FindResult {
        uuid: uuid.to_string(),
        matches: matches.iter().map(|p| p.display().to_string()).collect(),
    };
    if json_output {
        print_json(result, Vec::new());
    } else {
        for path in &result.matches {
            println!("{}", path);
        }
        println!(
            "\n{} {} match(es) for {}",
            "SUCCESS".green().bold(),
            result.matches.len(),
            uuid.cyan()
        );
    }
    Ok(ExitCode::SUCCESS)
}
