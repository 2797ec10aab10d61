use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("cartograph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("cartograph")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("explore")
                .about(
                    "Autonomously explore an application, building a graph of places and \
                transitions",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The root address to start exploring from")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-d --"driver-cmd" <CMD>)
                        .required(true)
                        .help(
                            "Command line of the automation driver process (newline-delimited \
                        JSON over stdin/stdout)",
                        ),
                )
                .arg(
                    arg!(--"max-places" <N>)
                        .required(false)
                        .help("Stop once this many places have been discovered")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-depth" <N>)
                        .required(false)
                        .help("Do not act from places deeper than this")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"content-threshold" <N>)
                        .required(false)
                        .help(
                            "Content/footer additions below this count are not a significant \
                        change",
                        )
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"volatile" <PATTERN>)
                        .required(false)
                        .help("Literal substring stripped before fingerprinting (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Persist the run to a sqlite database (default: in-memory)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Directory for graph export and screenshot evidence")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-s --"script" <PATH>)
                        .required(false)
                        .help(
                            "Action script: one label per line, selected in order \
                        (default: first available action)",
                        )
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("export")
                .about("Re-export the graph JSON of the most recent persisted run")
                .arg(
                    arg!(--"db" <PATH>)
                        .required(true)
                        .help("Path to the run database")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the graph JSON here (default: stdout)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("report")
                .about("Derive QA test flows from a persisted run and write the test report")
                .arg(
                    arg!(--"db" <PATH>)
                        .required(true)
                        .help("Path to the run database")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: markdown, json")
                        .value_parser(["markdown", "json"])
                        .default_value("markdown"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
