//! `mpm-server`: MCP server entry point.

use anyhow::Result;
use clap::Parser;
use mpm_logging::{init_logging, LogConfig};
use mpm_mcp::{McpServer, McpServerConfig};

#[derive(Debug, Parser)]
#[command(name = "mpm-server", about = "MCP server for grounded code intelligence", version)]
struct Cli {
    /// Bind this project root on startup (otherwise initialize_project
    /// or the MPM_PROJECT_ROOT fallback chain decides).
    #[arg(long, env = "MPM_PROJECT_ROOT")]
    project: Option<String>,

    /// Mirror the file-log verbosity onto stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(LogConfig {
        app_name: "mpm-server",
        verbose: cli.verbose,
    })?;

    let config = McpServerConfig {
        project_root: cli.project,
        ..Default::default()
    };
    McpServer::new(config).run().await
}
