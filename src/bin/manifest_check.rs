//! Validates manifest files against the manifest schema.
//!
//! Accepts files and directories (every `*.json` directly inside). Prints one
//! line per violation and exits non-zero if any manifest is invalid.

use anyhow::{Result, anyhow, bail};
use module_resolver::logging::init_cli_tracing;
use module_resolver::{ManifestValidator, collect_manifest_files};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("manifest-check: {err:#}");
            std::process::exit(2);
        }
    }
}

fn run() -> Result<bool> {
    let cli = Cli::parse()?;
    init_cli_tracing(false);
    let validator = match &cli.schema {
        Some(path) => ManifestValidator::load(path)?,
        None => ManifestValidator::bundled()?,
    };

    let mut files = Vec::new();
    for path in &cli.paths {
        if path.is_dir() {
            files.extend(collect_manifest_files(path)?.into_values());
        } else {
            files.push(path.clone());
        }
    }
    if files.is_empty() {
        bail!("no manifest files found");
    }

    let mut failures = 0usize;
    for file in &files {
        let problems = match fs::read_to_string(file) {
            Ok(data) => match serde_json::from_str::<Value>(&data) {
                Ok(value) => validator.violations(&value),
                Err(err) => vec![format!("invalid JSON: {err}")],
            },
            Err(err) => vec![format!("unable to read: {err}")],
        };
        if !problems.is_empty() {
            failures += 1;
        }
        for problem in problems {
            println!("{}: {problem}", file.display());
        }
    }

    eprintln!(
        "manifest-check: {} manifest(s) checked, {failures} invalid",
        files.len()
    );
    Ok(failures == 0)
}

struct Cli {
    schema: Option<PathBuf>,
    paths: Vec<PathBuf>,
}

impl Cli {
    fn parse() -> Result<Self> {
        let mut args = env::args_os();
        let _program = args.next();
        let mut schema = None;
        let mut paths = Vec::new();

        while let Some(arg) = args.next() {
            let arg_str = arg
                .to_str()
                .ok_or_else(|| anyhow!("invalid UTF-8 in argument"))?;
            match arg_str {
                "--schema" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--schema requires a value"))?;
                    schema = Some(PathBuf::from(value));
                }
                "--help" | "-h" => usage(0),
                other if other.starts_with("--") => bail!("unknown argument: {other}"),
                other => paths.push(PathBuf::from(other)),
            }
        }

        if paths.is_empty() {
            usage(2);
        }
        Ok(Self { schema, paths })
    }
}

fn usage(code: i32) -> ! {
    eprintln!(
        "Usage: manifest-check [--schema PATH] FILE_OR_DIR...\n\nOptions:\n  --schema PATH             Validate against PATH instead of the bundled schema.\n  --help                    Show this help text."
    );
    std::process::exit(code);
}
