use crate::CLAP_STYLING;
use clap::{arg, command};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("harrow")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("harrow")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("run")
                .about("Run a raking configuration and write the collected data")
                .arg(
                    arg!([CONFIG])
                        .required(true)
                        .help("Path to the YAML or JSON configuration"),
                )
                .arg(
                    arg!(-o --"out" <DIR>)
                        .required(false)
                        .help("Override the output directory from the configuration")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-v --"verbose")
                        .required(false)
                        .help("Enable engine trace logging on stderr")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("check")
                .about("Parse and validate a configuration without visiting anything")
                .arg(
                    arg!([CONFIG])
                        .required(true)
                        .help("Path to the YAML or JSON configuration"),
                ),
        )
}
