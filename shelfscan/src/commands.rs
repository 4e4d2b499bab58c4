use crate::handlers::parse_snapshot_arg;
use clap::arg;
use std::path::PathBuf;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("shelfscan")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("shelfscan")
        .about("Expands every category listing of a product catalog and writes the products to CSV")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .help("Path to a JSON config file (default: ~/.config/shelfscan/config.json if present)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(-o --"output" <PATH>)
                .required(false)
                .help("Where to write the CSV file (overrides the config)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"no-upload")
                .required(false)
                .help("Skip the spreadsheet upload even if one is configured")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(--"keep-going")
                .required(false)
                .help("Continue with the remaining categories after one fails")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(--"snapshot" <CATEGORY_FILE>)
                .required(false)
                .help(
                    "Extract CATEGORY from a saved HTML page instead of a live browser, as \
                CATEGORY=FILE. Repeatable; only the named categories are scraped.",
                )
                .action(clap::ArgAction::Append)
                .value_parser(parse_snapshot_arg),
        )
}
