//! Runs one resolver query against directory-backed manifest sources.
//!
//! Each `--source NAME=DIR` registers a directory of `*.json` manifests under
//! NAME. The tool waits until every source has delivered its snapshot, runs
//! the requested query, and prints the response as JSON on stdout.

use anyhow::{Context, Result, anyhow, bail};
use module_resolver::logging::init_cli_tracing;
use module_resolver::{
    DirectorySource, FindModulesByTypesQuery, FindModulesQuery, ModuleResolver, ParameterQuery,
    ResolverConfig, TypedParameterQuery, parse_assignment, split_list,
};
use serde::Serialize;
use std::env;
use std::path::PathBuf;

fn main() {
    if let Err(err) = run() {
        eprintln!("module-query: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse()?;
    init_cli_tracing(cli.verbose);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> Result<()> {
    let resolver = ModuleResolver::start(ResolverConfig::from_env());
    for (name, dir) in &cli.sources {
        resolver
            .add_source(name.as_str(), DirectorySource::new(dir))
            .await
            .with_context(|| format!("registering source {name}"))?;
    }
    let client = resolver.connect().await.context("connecting to resolver")?;

    let output = match cli.mode {
        Mode::Manifest(module_id) => {
            let manifest = client.get_module_manifest(module_id.as_str()).await?;
            to_json(&manifest)?
        }
        Mode::ByTypes => {
            let query = FindModulesByTypesQuery::new(
                cli.params
                    .iter()
                    .map(|(name, types)| TypedParameterQuery::new(name.as_str(), types.iter().cloned()))
                    .collect(),
            );
            to_json(&client.find_modules_by_types(query).await?)?
        }
        Mode::Find => {
            let query = FindModulesQuery {
                handler: cli.handler,
                action: cli.action,
                parameter_constraints: cli
                    .params
                    .iter()
                    .map(|(name, types)| ParameterQuery::new(name.as_str(), types.iter().cloned()))
                    .collect(),
            };
            to_json(&client.find_modules(query).await?)?
        }
    };

    resolver.shutdown().await;
    println!("{output}");
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serializing response")
}

enum Mode {
    Find,
    ByTypes,
    Manifest(String),
}

struct Cli {
    sources: Vec<(String, PathBuf)>,
    action: Option<String>,
    handler: Option<String>,
    params: Vec<(String, Vec<String>)>,
    mode: Mode,
    verbose: bool,
}

impl Cli {
    fn parse() -> Result<Self> {
        let mut args = env::args_os();
        let _program = args.next();
        let mut sources = Vec::new();
        let mut action = None;
        let mut handler = None;
        let mut params = Vec::new();
        let mut by_types = false;
        let mut manifest = None;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            let arg_str = arg
                .to_str()
                .ok_or_else(|| anyhow!("invalid UTF-8 in argument"))?;
            match arg_str {
                "--source" => {
                    let (name, dir) = parse_assignment(&next_value("--source", &mut args)?)?;
                    if sources.iter().any(|(existing, _)| existing == &name) {
                        bail!("source {name} given more than once");
                    }
                    sources.push((name, PathBuf::from(dir)));
                }
                "--action" => action = Some(next_value("--action", &mut args)?),
                "--handler" => handler = Some(next_value("--handler", &mut args)?),
                "--param" => {
                    let (name, types) = parse_assignment(&next_value("--param", &mut args)?)?;
                    params.push((name, split_list(&types)));
                }
                "--by-types" => by_types = true,
                "--manifest" => manifest = Some(next_value("--manifest", &mut args)?),
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => usage(0),
                other => bail!("unknown argument: {other}"),
            }
        }

        if sources.is_empty() {
            bail!("at least one --source NAME=DIR is required");
        }

        let mode = match (manifest, by_types) {
            (Some(_), true) => bail!("--manifest and --by-types are mutually exclusive"),
            (Some(module_id), false) => Mode::Manifest(module_id),
            (None, true) => {
                if action.is_some() || handler.is_some() {
                    bail!("--by-types queries take no --action or --handler");
                }
                Mode::ByTypes
            }
            (None, false) => Mode::Find,
        };

        Ok(Self {
            sources,
            action,
            handler,
            params,
            mode,
            verbose,
        })
    }
}

fn next_value(flag: &str, args: &mut env::ArgsOs) -> Result<String> {
    let value = args
        .next()
        .ok_or_else(|| anyhow!("{flag} requires a value"))?
        .into_string()
        .map_err(|_| anyhow!("{flag} must be valid UTF-8"))?;
    if value.trim().is_empty() {
        bail!("{flag} must not be empty");
    }
    Ok(value)
}

fn usage(code: i32) -> ! {
    eprintln!(
        "Usage: module-query --source NAME=DIR [--source NAME=DIR ...] [options]\n\nOptions:\n  --action ACTION           Match intent filters with this action.\n  --handler MODULE_ID       Restrict results to one module.\n  --param NAME=TYPE[,TYPE]  Caller parameter and its accepted types (repeatable).\n  --by-types                Enumerate type-only parameter mappings instead.\n  --manifest MODULE_ID      Print the manifest for MODULE_ID.\n  --verbose, -v             Debug logging on stderr (or set RUST_LOG).\n  --help                    Show this help text.\n\nEnvironment:\n  MODULE_RESOLVER_READINESS_INTERVAL_MS  Interval for logging sources that are not ready."
    );
    std::process::exit(code);
}
