pub mod commands;
pub mod handlers;

pub use commands::{CLAP_STYLING, command_argument_builder};
pub use handlers::{
    RunSettings, SnapshotArg, build_sinks, catalog_options, handle_run, init_logging,
    parse_snapshot_arg, snapshot_categories,
};
