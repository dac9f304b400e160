use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sqlrunner")]
#[command(about = "Apply a directory of SQL scripts to a SQL Server database", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Print machine-readable JSON instead of the text summary
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run every script in the configured directory (default)
    Run,
    /// List the databases on the configured server
    Databases,
}
