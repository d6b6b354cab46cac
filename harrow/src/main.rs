use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use harrow_core::{execute_run, sink, RunSummary, StaticProvider, TransformRegistry};
use harrow_engine::{Config, EngineKind};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod commands;

fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"
   __
  / /  ___ ___________ _    __
 / _ \/ _ `/ __/ __/ _ \ | /| / /
/_//_/\_,_/_/ /_/  \___/_/|_|/|_/

        harrow v{version}
  declarative web raking engine
"#
    );
}

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        Some(("run", primary_command)) => handle_run(primary_command, quiet).await,
        Some(("check", primary_command)) => handle_check(primary_command),
        None => {}
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

fn load_config(args: &ArgMatches) -> Config {
    let config_arg = args.get_one::<String>("CONFIG").map(String::as_str);
    let Some(config_arg) = config_arg else {
        // clap enforces the positional
        unreachable!("clap should ensure we don't get here");
    };

    let expanded = shellexpand::tilde(config_arg);
    match Config::load(Path::new(expanded.as_ref())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Could not load configuration:".red().bold(), e);
            std::process::exit(2);
        }
    }
}

/// The bundled provider set. Browser engines need an external provider
/// crate wired in; only the static fetcher ships in this binary.
fn provider_for(config: &Config) -> Arc<StaticProvider> {
    let kind = config.browser.kind.as_deref().unwrap_or("static");

    match EngineKind::from_name(kind) {
        Ok(EngineKind::Static) => {}
        Ok(other) => {
            eprintln!(
                "{} the {} engine needs an external browser provider; this build only bundles 'static'",
                "Unsupported browser:".red().bold(),
                other.name()
            );
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("{} {}", "Invalid configuration:".red().bold(), e);
            std::process::exit(2);
        }
    }

    match StaticProvider::new() {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            eprintln!("{} {}", "Could not start provider:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn handle_run(args: &ArgMatches, quiet: bool) {
    if args.get_flag("verbose") {
        tracing_subscriber::fmt::init();
    }

    let mut config = load_config(args);
    if let Some(out) = args.get_one::<PathBuf>("out") {
        config.output.path = out.display().to_string();
    }

    let provider = provider_for(&config);
    let headless = !config.browser.show;

    // The engine prints its own progress when `logging` is on; the
    // spinner would fight it for the terminal.
    let spinner = (!quiet && !config.logging).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Raking...");
        spinner
    });

    let outcome = match execute_run(config, provider, &TransformRegistry::new()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(spinner) = &spinner {
                spinner.finish_and_clear();
            }
            eprintln!("{} {:#}", "Run failed:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }

    if !quiet {
        println!("{}", "Run complete".green().bold());
        print!("{}", RunSummary::from_outcome(&outcome, headless).render());
    }

    if let Some(error) = &outcome.report.error {
        eprintln!("{} {}", "Aborted:".red().bold(), error);
        std::process::exit(1);
    }
}

fn handle_check(args: &ArgMatches) {
    let config = load_config(args);

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "Invalid configuration:".red().bold(), e);
        std::process::exit(2);
    }

    let outputs = match sink::resolve_outputs(&config.output) {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("{} {:#}", "Invalid output section:".red().bold(), e);
            std::process::exit(2);
        }
    };

    let kind = config.browser.kind.as_deref().unwrap_or("static");
    if let Err(e) = EngineKind::from_name(kind) {
        eprintln!("{} {}", "Invalid configuration:".red().bold(), e);
        std::process::exit(2);
    }

    println!("{}", "Configuration OK".green().bold());
    println!("  browser:  {}", kind);
    println!("  pages:    {}", config.pages.len());
    println!("  race:     {}", config.race);
    if outputs.is_empty() {
        println!("  outputs:  none configured");
    } else {
        for output in &outputs {
            println!("  output:   {}", output.path.display());
        }
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
