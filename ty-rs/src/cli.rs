//! Root CLI structure for ty-rs

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ty-rs")]
#[command(about = "Command-line tools for Ty the Tasmanian Tiger file formats", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// RKV archive operations
    Rkv {
        #[command(subcommand)]
        command: crate::commands::rkv::RkvCommands,
    },

    /// MDL model operations
    Mdl {
        #[command(subcommand)]
        command: crate::commands::mdl::MdlCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
