//! rigbind CLI - bind proxy meshes and build armatures from the command line
//!
//! This binary parses proxy files, builds armatures from rig definitions
//! and transfers skin weights and shapes onto proxies.

use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::process::ExitCode;

use rigbind_cli::commands;

/// rigbind - proxy mesh binding and armature construction
#[derive(Parser)]
#[command(name = "rigbind")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Show engine debug diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a proxy file and summarize it
    Proxy {
        /// Base mesh (OBJ, glTF or GLB)
        #[arg(short, long)]
        mesh: String,

        /// Path to the proxy file
        #[arg(short, long)]
        file: String,

        /// Proxy type (clothes, hair, eyes, proxy, cage)
        #[arg(short = 't', long = "type")]
        proxy_type: Option<String>,

        /// Converter file for proxies authored on the legacy base mesh
        #[arg(long)]
        converter: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Build an armature and print its bones and bind matrices
    Build {
        /// Base mesh (OBJ, glTF or GLB)
        #[arg(short, long)]
        mesh: String,

        /// Rig definition JSON
        #[arg(short, long)]
        rig: String,

        /// Rig preset JSON (options and bone names)
        #[arg(short, long)]
        preset: Option<String>,

        /// Reference pose JSON; enables the T-pose
        #[arg(long)]
        pose: Option<String>,

        /// Export scale (default: the preset's scale)
        #[arg(short, long)]
        scale: Option<f64>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Build an armature and bind proxy files to it
    Bind {
        /// Base mesh (OBJ, glTF or GLB)
        #[arg(short, long)]
        mesh: String,

        /// Rig definition JSON
        #[arg(short, long)]
        rig: String,

        /// Proxy files to bind (repeatable); `.proxy` files replace the body
        #[arg(short, long = "file", required = true)]
        files: Vec<String>,

        /// Proxy type for files that are not `.proxy`
        #[arg(short = 't', long = "type")]
        proxy_type: Option<String>,

        /// Converter file for proxies authored on the legacy base mesh
        #[arg(long)]
        converter: Option<String>,

        /// Rig preset JSON (options and bone names)
        #[arg(short, long)]
        preset: Option<String>,

        /// Reference pose JSON; enables the T-pose
        #[arg(long)]
        pose: Option<String>,

        /// Export scale (default: the preset's scale)
        #[arg(short, long)]
        scale: Option<f64>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Find proxy files by uuid
    Find {
        /// Directory to search
        #[arg(short, long)]
        dir: String,

        /// Uuid to look for
        #[arg(short, long)]
        uuid: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },
}

/// Maximum level shown on stderr for the given verbosity.
fn log_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // stderr, so --json output on stdout stays parseable
    pretty_env_logger::formatted_builder()
        .filter_level(log_level(cli.verbose))
        .init();

    let result = match cli.command {
        Commands::Proxy {
            mesh,
            file,
            proxy_type,
            converter,
            json,
        } => commands::proxy::run(
            &mesh,
            &file,
            proxy_type.as_deref(),
            converter.as_deref(),
            json,
        ),
        Commands::Build {
            mesh,
            rig,
            preset,
            pose,
            scale,
            json,
        } => commands::build::run(
            &commands::build::BuildArgs {
                mesh: &mesh,
                rig: &rig,
                preset: preset.as_deref(),
                pose: pose.as_deref(),
                scale,
            },
            json,
        ),
        Commands::Bind {
            mesh,
            rig,
            files,
            proxy_type,
            converter,
            preset,
            pose,
            scale,
            json,
        } => commands::bind::run(
            &commands::bind::BindArgs {
                mesh: &mesh,
                rig: &rig,
                files: &files,
                proxy_type: proxy_type.as_deref(),
                converter: converter.as_deref(),
                preset: preset.as_deref(),
                pose: pose.as_deref(),
                scale,
            },
            json,
        ),
        Commands::Find { dir, uuid, json } => commands::find::run(&dir, &uuid, json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
