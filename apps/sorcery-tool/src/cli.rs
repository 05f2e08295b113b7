use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the object sets of a config file
    Dump {
        /// Config file to read
        file: PathBuf,

        /// Only this section
        #[arg(short, long)]
        section: Option<String>,

        /// Field values a section must carry (field=value, repeatable)
        #[arg(short, long)]
        criteria: Vec<String>,

        /// Print JSON instead of name = value lines
        #[arg(long)]
        json: bool,
    },

    /// Show what changed between two versions of a config file
    Diff {
        /// Original file
        old: PathBuf,

        /// Modified file
        new: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the backend chains declared in a mapping file
    Mappings {
        /// Mapping file to read
        file: PathBuf,

        /// Only this module section
        #[arg(short, long)]
        section: Option<String>,
    },
}
