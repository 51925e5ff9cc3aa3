use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use magicscope_core::{FlagToken, MagicConfig, MagicError, VOCABULARY};
use magicscope_ffi::{self as magic, FileMagic};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "magicscope",
    about = "Identify file contents with libmagic",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format.
    /// Also enabled by setting MAGICSCOPE_JSON=1 or `json = true` in the config.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe files; `-` reads standard input.
    Describe {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Flag symbol or number; repeatable.
        #[arg(short, long = "flag", action = clap::ArgAction::Append)]
        flags: Vec<String>,
        /// Shorthand for `--flag mime`.
        #[arg(short = 'i', long)]
        mime: bool,
        /// Print only the lower-cased first word of each result.
        #[arg(short, long)]
        simple: bool,
        /// Use this database instead of the default.
        #[arg(short = 'm', long)]
        database: Option<PathBuf>,
    },

    /// List the flags the linked libmagic supports.
    Flags {
        /// Include flags this libmagic lacks.
        #[arg(long)]
        all: bool,
    },

    /// Resolve flag tokens into a mask.
    Resolve { tokens: Vec<String> },

    /// Magic database management.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Show version information.
    Version,
}

// ─── Database Actions ───────────────────────────────────────────────────────

#[derive(Subcommand)]
enum DbAction {
    /// Print database entries (default database if omitted).
    List { path: Option<PathBuf> },
    /// Check a database for consistency.
    Check { path: Option<PathBuf> },
    /// Compile a database source file into `<name>.mgc`.
    Compile { path: PathBuf },
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = MagicConfig::config_path();
    let config =
        MagicConfig::load().with_context(|| format!("loading {}", config_path.display()))?;
    debug!(path = %config_path.display(), read_length = config.read_length, "loaded config");
    let json_output =
        cli.json || config.json || std::env::var("MAGICSCOPE_JSON").as_deref() == Ok("1");

    match cli.command {
        Commands::Describe {
            paths,
            flags,
            mime,
            simple,
            database,
        } => {
            let mut tokens = parse_tokens(&flags)?;
            if mime {
                tokens.push(FlagToken::from("mime"));
            }

            let mut options = config.analyzer_options()?;
            if simple {
                options.simplified = Some(true);
            }
            if database.is_some() {
                options.database = database;
            }

            let mut fm = magic::open(&tokens, options)?;
            let mut failed = false;
            let mut results = Vec::new();

            for path in &paths {
                match describe(&mut fm, path, config.read_length) {
                    Ok(description) => {
                        if json_output {
                            results.push(serde_json::json!({
                                "path": path.display().to_string(),
                                "description": description,
                            }));
                        } else {
                            println!("{}: {description}", path.display());
                        }
                    }
                    Err(e) => {
                        failed = true;
                        debug!(path = %path.display(), error = %e, "describe failed");
                        if json_output {
                            let engine = e
                                .downcast_ref::<MagicError>()
                                .and_then(MagicError::engine_message);
                            results.push(serde_json::json!({
                                "path": path.display().to_string(),
                                "error": e.to_string(),
                                "engine_message": engine,
                            }));
                        } else {
                            eprintln!("{}: {e}", path.display());
                        }
                    }
                }
            }
            fm.close();

            if json_output {
                print_json(&serde_json::json!({
                    "status": if failed { "error" } else { "ok" },
                    "data": results,
                }))?;
            }
            if failed {
                std::process::exit(1);
            }
        }

        Commands::Flags { all } => {
            let codec = magic::codec();
            let rows: Vec<_> = VOCABULARY
                .iter()
                .map(|def| (def, codec.resolve(&[FlagToken::from(def.name)]).ok()))
                .filter(|(_, bits)| all || bits.is_some())
                .collect();

            if json_output {
                let items: Vec<_> = rows
                    .iter()
                    .map(|(def, bits)| {
                        serde_json::json!({
                            "name": def.name,
                            "bits": bits,
                            "supported": bits.is_some(),
                            "since": def.since.to_string(),
                            "doc": def.doc,
                        })
                    })
                    .collect();
                print_json(&serde_json::json!({ "status": "ok", "data": items }))?;
            } else {
                for (def, bits) in rows {
                    let bits = bits.map_or_else(|| "-".to_string(), |b| format!("{b:#09x}"));
                    println!("{:<20} {bits:>10}  {}", def.name, def.doc);
                }
            }
        }

        Commands::Resolve { tokens } => {
            let tokens = parse_tokens(&tokens)?;
            let mask = magic::resolve(&tokens)?;
            let symbols = magic::codec().symbols(mask);

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "mask": mask, "flags": symbols },
                }))?;
            } else {
                println!("{mask} ({mask:#x}): {}", symbols.join(" "));
            }
        }

        Commands::Db { action } => {
            let mut fm = magic::open(&[], config.analyzer_options()?)?;
            match action {
                DbAction::List { path } => fm.list_database(path.as_deref())?,
                DbAction::Check { path } => {
                    let valid = fm.check_database(path.as_deref())?;
                    if json_output {
                        print_json(&serde_json::json!({ "status": "ok", "data": { "valid": valid } }))?;
                    } else {
                        println!("{}", if valid { "valid" } else { "invalid" });
                    }
                    if !valid {
                        std::process::exit(1);
                    }
                }
                DbAction::Compile { path } => {
                    fm.compile_database(Some(&path))?;
                    if !json_output {
                        println!("compiled {}", path.display());
                    }
                }
            }
        }

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            let library = magic::library_version();
            let database = magic::default_database_path();
            if json_output {
                print_json(&serde_json::json!({
                    "version": version,
                    "libmagic": library.to_string(),
                    "database": database.map(|p| p.display().to_string()),
                }))?;
            } else {
                println!("magicscope v{version}");
                println!("libmagic {library}");
                if let Some(path) = database {
                    println!("magic file from {}", path.display());
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("MAGICSCOPE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_tokens(raw: &[String]) -> Result<Vec<FlagToken>> {
    raw.iter()
        .map(|s| FlagToken::parse(s).map_err(anyhow::Error::from))
        .collect()
}

fn describe(fm: &mut FileMagic, path: &Path, read_length: usize) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = Vec::with_capacity(read_length);
        std::io::stdin()
            .lock()
            .take(read_length as u64)
            .read_to_end(&mut buf)
            .context("reading standard input")?;
        return Ok(fm.describe_buffer(&buf, None)?);
    }
    Ok(fm.describe_file(path, None)?)
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}
