use anyhow::Result;
use clap::{Parser, Subcommand};
use std::num::NonZeroUsize;
use termlens_cli::api::{self, Config, Pipeline};
use termlens_cli::envelope;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "termlens")]
#[command(about = "Explain an unfamiliar term from live search evidence and a local LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Explain a term: keywords -> web search -> model synthesis (json by default).
    Explain(ExplainCmd),
    /// Show the resolved configuration (json; no network, no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ExplainCmd {
    /// Free-text query about the term.
    query: String,
    /// Model identifier (overrides TERMLENS_MODEL).
    #[arg(long)]
    model: Option<String>,
    /// Number of search results requested (overrides TERMLENS_SEARCH_LIMIT).
    #[arg(long)]
    search_limit: Option<NonZeroUsize>,
    /// Search language hint, e.g. "ja" or "en_US.UTF-8" (overrides TERMLENS_LOCALE).
    #[arg(long)]
    locale: Option<String>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Emit pipeline debug events on stderr (otherwise TERMLENS_LOG, default warn).
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Opt-in env-file loader (`TERMLENS_ENV_FILE`). Never overrides the process environment.
fn load_env_file() {
    let Ok(p) = std::env::var("TERMLENS_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn logger(verbose: bool) -> tracing::Dispatch {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("TERMLENS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::Dispatch::new(subscriber)
}

fn resolve_config(args: &ExplainCmd) -> Config {
    let mut cfg = Config::from_env().with_logger(logger(args.verbose));
    if let Some(m) = args.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        cfg = cfg.with_model(m);
    }
    if let Some(n) = args.search_limit {
        cfg = cfg.with_search_limit(n);
    }
    if let Some(l) = args.locale.as_deref() {
        cfg = cfg.with_locale(locale_flag(l));
    }
    cfg
}

fn locale_flag(l: &str) -> Option<String> {
    // An explicit empty --locale disables the hint.
    if l.trim().is_empty() {
        return None;
    }
    api::language_hint(l)
}

fn has_env(k: &str) -> bool {
    std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();

    match cli.command {
        Commands::Explain(args) => {
            let cfg = resolve_config(&args);
            let outcome = match api::validate_query(&args.query) {
                Err(e) => Err(e),
                Ok(_) => {
                    let pipeline = Pipeline::local_from_env()?;
                    pipeline.comprehend(&args.query, &cfg).await
                }
            };
            let text_mode = args.output.eq_ignore_ascii_case("text");
            match outcome {
                Ok(u) => {
                    if text_mode {
                        print!("{}", envelope::explain_text(&u));
                    } else {
                        println!("{}", envelope::explain_ok(&u));
                    }
                }
                Err(e) => {
                    if text_mode {
                        eprintln!("error[{}]: {}", e.kind(), e.detail());
                        if let Some(h) = envelope::error_hint(e.kind()) {
                            eprintln!("hint: {h}");
                        }
                    } else {
                        println!("{}", envelope::explain_err(&args.query, &e));
                    }
                    std::process::exit(1);
                }
            }
        }
        Commands::Doctor(args) => {
            let cfg = Config::from_env();
            let ollama = api::local::OllamaClient::from_env(api::local::default_http_client()?);
            let ollama_base_url = ollama.base_url().to_string();
            let v = serde_json::json!({
                "schema_version": envelope::SCHEMA_VERSION,
                "kind": "doctor",
                "ok": true,
                "name": "termlens",
                "version": env!("CARGO_PKG_VERSION"),
                "config": {
                    "model": cfg.model,
                    "search_limit": cfg.search_limit.get(),
                    "locale": cfg.locale,
                    "search_endpoint": api::SEARCH_ENDPOINT,
                    "ollama_base_url": ollama_base_url,
                },
                "env": {
                    "TERMLENS_MODEL": has_env("TERMLENS_MODEL"),
                    "TERMLENS_SEARCH_LIMIT": has_env("TERMLENS_SEARCH_LIMIT"),
                    "TERMLENS_LOCALE": has_env("TERMLENS_LOCALE"),
                    "TERMLENS_OLLAMA_BASE_URL": has_env("TERMLENS_OLLAMA_BASE_URL"),
                    "TERMLENS_ENV_FILE": has_env("TERMLENS_ENV_FILE"),
                },
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("termlens {}", env!("CARGO_PKG_VERSION"));
                    println!("  model:        {}", cfg.model);
                    println!("  search_limit: {}", cfg.search_limit);
                    println!(
                        "  locale:       {}",
                        cfg.locale.as_deref().unwrap_or("(none)")
                    );
                    println!("  ollama:       {ollama_base_url}");
                }
                _ => println!("{}", v),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": envelope::SCHEMA_VERSION,
                "kind": "version",
                "ok": true,
                "name": "termlens",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("termlens {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }

    Ok(())
}
