use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "cmodel")]
#[command(about = "Browse the C/C++ element model of a project: sources, binaries, archives and their symbols")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    #[arg(long, value_name = "N", global = true)]
    pub cache_capacity: Option<usize>,

    #[arg(long, value_name = "N", global = true)]
    pub cache_overflow: Option<usize>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Print the model tree of a project.
    Tree {
        project: PathBuf,

        #[arg(long, value_name = "N", default_value_t = 8)]
        depth: usize,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Print the structure of one binary or archive.
    Binary {
        file: PathBuf,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Find the binaries of a project and record changed ones in the index.
    Scan {
        project: PathBuf,
    },
    Stats,
    Clear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
