//! wsmodel CLI entry point.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wsmodel_engine::WorkspaceModel;
use wsmodel_foundation::EntityKind;
use wsmodel_runtime::{
    APPLICATION_HOME_DIR, CacheConfig, CacheLoad, CacheSerializer, PROJECT_DIR, USER_HOME,
    UrlRelativizer,
};
use wsmodel_storage::{Storage, collect_changes, format_changes};

/// CLI configuration parsed from arguments.
#[derive(Default)]
struct CliConfig {
    command: Option<String>,
    file: Option<PathBuf>,
    project_dir: Option<String>,
    user_home: Option<String>,
    app_home: Option<String>,
    list: Option<usize>,
    show_help: bool,
    show_version: bool,
    verbose: bool,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\x1b[31mError: {e}\x1b[0m");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let mut config = CliConfig::default();
    let mut args = args.into_iter().skip(1);

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "-h" | "--help" => config.show_help = true,
            "-V" | "--version" => config.show_version = true,
            "-v" | "--verbose" => config.verbose = true,
            "--project-dir" => config.project_dir = Some(value("--project-dir")?),
            "--user-home" => config.user_home = Some(value("--user-home")?),
            "--app-home" => config.app_home = Some(value("--app-home")?),
            "--list" => {
                let raw = value("--list")?;
                config.list = Some(
                    raw.parse()
                        .map_err(|_| format!("invalid --list value: {raw}"))?,
                );
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option: {flag}").into());
            }
            positional if config.command.is_none() => config.command = Some(positional.to_string()),
            positional if config.file.is_none() => config.file = Some(PathBuf::from(positional)),
            positional => return Err(format!("unexpected argument: {positional}").into()),
        }
    }

    Ok(config)
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(args: Vec<String>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = parse_args(args)?;

    if config.show_help {
        print_help();
        return Ok(ExitCode::SUCCESS);
    }

    if config.show_version {
        println!("wsmodel {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(config.verbose);

    match config.command.as_deref() {
        Some("inspect") => inspect(&config),
        Some(other) => Err(format!("unknown command: {other}").into()),
        None => {
            print_help();
            Ok(ExitCode::FAILURE)
        }
    }
}

fn relativizer(config: &CliConfig) -> Result<UrlRelativizer, Box<dyn std::error::Error>> {
    let mut relativizer = UrlRelativizer::new();
    let home = config.user_home.clone().or_else(|| env::var("HOME").ok());
    for (name, path) in [
        (PROJECT_DIR, config.project_dir.as_deref()),
        (USER_HOME, home.as_deref()),
        (APPLICATION_HOME_DIR, config.app_home.as_deref()),
    ] {
        if let Some(path) = path {
            relativizer.register(name, path)?;
        }
    }
    Ok(relativizer)
}

fn inspect(config: &CliConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let file = config.file.as_ref().ok_or("inspect requires a cache file")?;
    let serializer = CacheSerializer::new(CacheConfig::default()).with_relativizer(relativizer(config)?);

    let storage = match serializer.load_from_file(file) {
        CacheLoad::Hit(storage) => storage,
        CacheLoad::Miss(reason) => {
            println!("\x1b[33mCache miss:\x1b[0m {reason}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let model = WorkspaceModel::new();
    let version = model.load_storage("Inspect cache", storage)?;

    let storage = model.storage();
    print_summary(&storage, version);
    if let Some(limit) = config.list {
        println!();
        println!("{}", format_changes(&collect_changes(&Storage::new(), &storage), limit));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(storage: &Storage, version: u64) {
    println!("\x1b[1;36m=== Cached Model ===\x1b[0m");
    println!("Format: {}", CacheConfig::default().format_version);
    println!("Version: {version}");
    println!("Entities: {}", storage.total_count());
    for kind in EntityKind::ALL {
        let count = storage.entity_count(kind);
        if count > 0 {
            println!("  {:<14} {count}", kind.to_string());
        }
    }
}

fn print_help() {
    println!(
        "\x1b[1mwsmodel\x1b[0m - Workspace model cache inspector

\x1b[1mUSAGE:\x1b[0m
    wsmodel inspect <CACHE-FILE> [OPTIONS]

\x1b[1mOPTIONS:\x1b[0m
    --project-dir DIR   Base for $PROJECT_DIR$ URLs
    --user-home DIR     Base for $USER_HOME$ URLs (defaults to $HOME)
    --app-home DIR      Base for $APPLICATION_HOME_DIR$ URLs
    --list N            List up to N entities of each kind
    -v, --verbose       Enable debug logging (RUST_LOG overrides)
    -h, --help          Print help information
    -V, --version       Print version information

\x1b[1mEXAMPLES:\x1b[0m
    wsmodel inspect model.cache
    wsmodel inspect model.cache --project-dir ~/src/app --list 20"
    );
}
