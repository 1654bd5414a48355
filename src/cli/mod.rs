mod ask;
mod providers;
mod seed;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::core::warehouse::Warehouse;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("serve", "Start the HTTP API")
        .command("ask", "Run one question through the pipeline and print JSON")
        .print();

    GuideSection::new("Data")
        .command("seed", "Write the synthetic sales cube to a SQLite file")
        .print();

    GuideSection::new("Diagnostics")
        .command("providers", "List language-model providers and their credentials")
        .command("help", "Show this guide")
        .print();

    GuideSection::new("Flags")
        .text("serve      [--api-host H] [--api-port P] [--db PATH] [--config PATH]")
        .text("ask        --query Q [--provider P] [--db PATH] [--config PATH]")
        .text("seed       --db PATH [--rows N] [--seed S]")
        .blank()
        .hint("Environment: CUBEWISE_API_HOST, CUBEWISE_API_PORT, CUBEWISE_DB, CUBEWISE_LOG")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("cubewise").green()
    );
}

/// Value following `flag`, if present.
fn flag_value<'a>(args: &'a [String], start: usize, flag: &str) -> Option<&'a str> {
    let mut i = start;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).map(String::as_str);
        }
        i += 1;
    }
    None
}

pub(crate) fn parse_path_flag(args: &[String], start: usize, flag: &str) -> Option<PathBuf> {
    flag_value(args, start, flag)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
    mut api_host: String,
    mut api_port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(api_port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AskCommandArgs {
    pub query: String,
    pub provider: String,
}

pub(crate) fn parse_ask_command_args(args: &[String], start: usize) -> AskCommandArgs {
    let mut query = String::new();
    let mut provider = "anthropic".to_string();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--query" | "-q" => {
                if i + 1 < args.len() {
                    query = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--provider" | "-p" => {
                if i + 1 < args.len() {
                    provider = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    AskCommandArgs { query, provider }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeedCommandArgs {
    pub rows: Option<usize>,
    pub seed: Option<u64>,
}

pub(crate) fn parse_seed_command_args(args: &[String], start: usize) -> Result<SeedCommandArgs> {
    let rows = flag_value(args, start, "--rows")
        .map(|v| v.parse().with_context(|| format!("--rows expects a count, got '{v}'")))
        .transpose()?;
    let seed = flag_value(args, start, "--seed")
        .map(|v| v.parse().with_context(|| format!("--seed expects an integer, got '{v}'")))
        .transpose()?;
    Ok(SeedCommandArgs { rows, seed })
}

/// Opens the configured cube (or an in-memory one) and seeds it when empty.
pub(crate) async fn open_warehouse(config: &AppConfig) -> Result<Warehouse> {
    let warehouse = match &config.db_path {
        Some(path) => Warehouse::open(path)
            .with_context(|| format!("cannot open warehouse at {}", path.display()))?,
        None => Warehouse::in_memory()?,
    };
    let rows = warehouse
        .ensure_seeded(config.dataset_rows, config.dataset_seed)
        .await?;
    info!("Warehouse ready with {} fact rows", rows);
    Ok(warehouse)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let config_path = parse_path_flag(&args, 2, "--config");
    let mut config = AppConfig::load(config_path.as_deref()).await?;
    if let Some(db) = parse_path_flag(&args, 2, "--db") {
        config.db_path = Some(db);
    }

    match args[1].as_str() {
        "serve" => {
            (config.api_host, config.api_port) =
                parse_api_server_flags(&args, 2, config.api_host, config.api_port);
            serve::run(config).await
        }
        "ask" => {
            let parsed = parse_ask_command_args(&args, 2);
            if parsed.query.trim().is_empty() {
                print_error("Error: --query is required for ask.");
                print_help();
                return Ok(());
            }
            ask::run(config, parsed).await
        }
        "seed" => {
            let parsed = parse_seed_command_args(&args, 2)?;
            seed::run(config, parsed).await
        }
        "providers" => {
            providers::run();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command '{other}'."));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_api_server_flags, parse_ask_command_args, parse_path_flag,
        parse_seed_command_args,
    };
    use std::path::PathBuf;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn parse_api_server_flags_reads_host_and_port() {
        let args = argv(&[
            "cubewise",
            "serve",
            "--api-host",
            "0.0.0.0",
            "--api-port",
            "19000",
        ]);
        let (host, port) = parse_api_server_flags(&args, 2, "127.0.0.1".to_string(), 17890);
        assert_eq!(host, "0.0.0.0");
        assert_eq!(port, 19000);
    }

    #[test]
    fn parse_api_server_flags_keeps_defaults_on_bad_port() {
        let args = argv(&["cubewise", "serve", "--api-port", "http", "--api-host"]);
        let (host, port) = parse_api_server_flags(&args, 2, "127.0.0.1".to_string(), 17890);
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 17890);
    }

    #[test]
    fn parse_ask_command_args_reads_query_and_provider() {
        let args = argv(&[
            "cubewise",
            "ask",
            "--db",
            "cube.db",
            "--query",
            "Top 5 countries by profit in 2024",
            "-p",
            "openai",
        ]);
        let parsed = parse_ask_command_args(&args, 2);
        assert_eq!(parsed.query, "Top 5 countries by profit in 2024");
        assert_eq!(parsed.provider, "openai");
        assert_eq!(
            parse_path_flag(&args, 2, "--db"),
            Some(PathBuf::from("cube.db"))
        );
    }

    #[test]
    fn parse_ask_command_args_defaults_provider() {
        let parsed = parse_ask_command_args(&argv(&["cubewise", "ask", "-q", "hi"]), 2);
        assert_eq!(parsed.provider, "anthropic");
        assert_eq!(parse_path_flag(&argv(&["cubewise", "ask"]), 2, "--db"), None);
    }

    #[test]
    fn parse_seed_command_args_validates_numbers() {
        let parsed = parse_seed_command_args(
            &argv(&["cubewise", "seed", "--rows", "500", "--seed", "7"]),
            2,
        )
        .unwrap();
        assert_eq!(parsed.rows, Some(500));
        assert_eq!(parsed.seed, Some(7));

        let err = parse_seed_command_args(&argv(&["cubewise", "seed", "--rows", "many"]), 2)
            .unwrap_err();
        assert!(err.to_string().contains("--rows"));
    }
}
