//! `sopflow` command line

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use sopflow::{logging, run_simulation, SimulationConfig};
use sopflow_core::{EngineConfig, SystemClock};
use sopflow_ratelimit::RateLimiter;
use std::path::PathBuf;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("sopflow")
        .version(sopflow::VERSION)
        .about("SOP authoring core: wizard sessions, export jobs, rate limits")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file (defaults apply when omitted)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Run a wizard, generation and export scenario offline")
                .arg(
                    Arg::new("inputs")
                        .long("inputs")
                        .default_value("5")
                        .value_parser(value_parser!(usize))
                        .help("Inputs submitted to the wizard"),
                )
                .arg(
                    Arg::new("jobs")
                        .long("jobs")
                        .default_value("3")
                        .value_parser(value_parser!(usize))
                        .help("Export jobs queued after generation"),
                )
                .arg(
                    Arg::new("fail-every")
                        .long("fail-every")
                        .value_parser(value_parser!(u64))
                        .help("Make every k-th render fail"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("rate")
                .about("Exercise the sliding-window limiter")
                .arg(
                    Arg::new("key")
                        .long("key")
                        .default_value("u1")
                        .help("Identity to limit"),
                )
                .arg(
                    Arg::new("max")
                        .long("max")
                        .default_value("5")
                        .value_parser(value_parser!(u32))
                        .help("Requests allowed per window"),
                )
                .arg(
                    Arg::new("window-ms")
                        .long("window-ms")
                        .default_value("60000")
                        .value_parser(value_parser!(u64))
                        .help("Window length in milliseconds"),
                )
                .arg(
                    Arg::new("calls")
                        .long("calls")
                        .default_value("6")
                        .value_parser(value_parser!(u32))
                        .help("Checks to perform"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<EngineConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    logging::init(matches.get_flag("log-json"))?;
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let sim = SimulationConfig {
                inputs: args.get_one::<usize>("inputs").copied().unwrap_or(5),
                jobs: args.get_one::<usize>("jobs").copied().unwrap_or(3),
                fail_every: args.get_one::<u64>("fail-every").copied(),
            };

            let report = run_simulation(config, sim, Arc::new(SystemClock)).await?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }

            if !report.passed() {
                std::process::exit(1);
            }
        }
        Some(("config", args)) => {
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Some(("rate", args)) => {
            let key = args
                .get_one::<String>("key")
                .map_or("u1", String::as_str);
            let max = args.get_one::<u32>("max").copied().unwrap_or(5);
            let window_ms = args.get_one::<u64>("window-ms").copied().unwrap_or(60_000);
            let calls = args.get_one::<u32>("calls").copied().unwrap_or(6);

            let limiter = RateLimiter::new(Arc::new(SystemClock));
            println!("Key: {key}  Limit: {max} per {window_ms}ms");
            for call in 1..=calls {
                let check = limiter.check(key, max, window_ms);
                println!(
                    "  #{call}: {} (remaining {}, reset in {}s)",
                    if check.allowed { "allowed" } else { "rejected" },
                    check.remaining,
                    check.reset_in_seconds
                );
            }
        }
        _ => {}
    }

    Ok(())
}
