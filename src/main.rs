use std::sync::Arc;

use clap::{Parser, Subcommand};
use skillflow::audit::FileAuditLog;
use skillflow::config::AppConfig;
use skillflow::recording_tap::RecordingCallTap;
use skillflow::{metrics, server, Facade};
use skillflow_engine::Engine;
use skillflow_mcp::ClientManager;
use skillflow_recording::RecordingManager;
use skillflow_skills::SkillManager;
use skillflow_storage::Storage;

#[derive(Debug, Parser)]
#[command(name = "skillflow", about = "Recording-and-replay layer for MCP tool-using agents")]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs the façade as a stdio MCP server.
    Serve,
    /// Server registry import/export (spec §4.K).
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Loads a `mcpServers`/`servers` document and registers every server.
    Import { path: std::path::PathBuf },
    /// Writes every registered server back out as a `servers` document.
    Export { path: std::path::PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.config.init_tracing();

    let storage = Arc::new(Storage::open(&cli.config.data_dir).await?);
    let mcp = Arc::new(ClientManager::new(cli.config.client_name.clone(), cli.config.client_version.clone()));
    for server_config in storage.load_registry().await {
        mcp.register(server_config);
    }

    let skills = Arc::new(SkillManager::new(storage.clone()));
    let recording = Arc::new(RecordingManager::new(storage.clone()));
    mcp.set_tap(Arc::new(RecordingCallTap::new(recording.clone())));
    let engine = Arc::new(Engine::new(storage.clone(), mcp.clone(), skills.clone()));
    let audit = Arc::new(FileAuditLog::new(cli.config.audit_log_path()));

    if let Some(addr) = cli.config.metrics_addr {
        metrics::install(addr);
    }

    let _watcher = skillflow::watcher::FileWatcher::start(storage.clone());

    match cli.command {
        Commands::Serve => {
            let facade = Facade::new(storage, mcp, skills, recording, engine, audit);
            server::serve_stdio(&facade, &cli.config.client_name, &cli.config.client_version).await;
        }
        Commands::Config { action } => match action {
            ConfigAction::Import { path } => {
                let count = skillflow::config::import_servers(&path, &mcp).await?;
                storage.save_registry(&mcp.list_servers()).await?;
                println!("registered {count} server(s) from {}", path.display());
            }
            ConfigAction::Export { path } => {
                skillflow::config::export_servers(&path, &mcp).await?;
                println!("exported {} server(s) to {}", mcp.list_servers().len(), path.display());
            }
        },
    }

    Ok(())
}
