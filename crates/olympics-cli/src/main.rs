//! `olympics`: run an AI Olympics tournament from a TOML arena file.

mod config;

use clap::{Parser, Subcommand};
use config::ArenaConfig;
use olympics_agent::{DefaultExecutorFactory, LocalSandboxManager};
use olympics_core::InMemoryTaskRegistry;
use olympics_orchestrator::{
    ArenaContext, ArenaService, FileSnapshotStore, SnapshotStore, TournamentStanding,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "olympics", about = "AI Olympics: agents compete on timed browser tasks")]
struct Cli {
    /// Path to the arena file
    #[arg(short, long, default_value = "arena.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured tournament and print the final standings
    Run {
        /// Seed for task picks and coin flips (overrides config)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Inspect configured tasks
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// List competitions that never finished (left-over snapshots)
    Snapshots,
}

#[derive(Subcommand)]
enum TaskAction {
    /// List configured tasks
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read config file '{}': {}",
            cli.config.display(),
            e
        )
    })?;
    let config = ArenaConfig::parse(&config_str)?;

    match cli.command {
        Commands::Run { seed } => run(config, seed).await?,
        Commands::Tasks { action } => match action {
            TaskAction::List => {
                if config.tasks.is_empty() {
                    println!("No tasks configured.");
                    println!("Add tasks to the arena file under [[tasks]]");
                } else {
                    println!("Configured tasks:");
                    for task in &config.tasks {
                        println!(
                            "  {} ({}): {} scoring, {}s limit, max {}",
                            task.id,
                            task.name,
                            serde_json::to_value(task.scoring_method)?
                                .as_str()
                                .unwrap_or("?"),
                            task.time_limit,
                            task.max_score
                        );
                    }
                    println!("\nTotal: {} task(s)", config.tasks.len());
                }
            }
        },
        Commands::Snapshots => {
            let store = FileSnapshotStore::new(config.data_dir.clone()).await?;
            let ids = store.list_snapshots().await?;
            if ids.is_empty() {
                println!("No unfinished competitions.");
            }
            for id in ids {
                match store.load_competition_snapshot(id).await? {
                    Some(c) => println!(
                        "  {} {:?} event {}/{} ({})",
                        c.id,
                        c.status,
                        c.current_event_index + 1,
                        c.events.len(),
                        c.name
                    ),
                    None => println!("  {id} (gone)"),
                }
            }
        }
    }

    Ok(())
}

async fn run(config: ArenaConfig, seed: Option<u64>) -> anyhow::Result<()> {
    let sandboxes = Arc::new(LocalSandboxManager::new(config.sandbox.clone()));
    let executors = Arc::new(DefaultExecutorFactory::new(config.webhook.clone()));
    let snapshots = Arc::new(FileSnapshotStore::new(config.data_dir.clone()).await?);
    let registry = Arc::new(InMemoryTaskRegistry::with_tasks(config.tasks.clone()));
    info!(
        agents = config.agents.len(),
        tasks = registry.len(),
        data_dir = %config.data_dir.display(),
        "Arena configured"
    );

    let ctx = ArenaContext::new(sandboxes, executors)
        .with_snapshots(snapshots)
        .with_config(config.competition.clone());
    let mut service = ArenaService::new(ctx, registry);
    if let Some(seed) = seed.or(config.seed) {
        service = service.with_seed(seed);
    }

    let mut events = service.events().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(kind = event.kind(), "Arena event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let created = service.create_tournament(config.tournament_config()).await?;
    let result = service.run_tournament(created.id).await;
    service.shutdown().await;
    printer.abort();

    let tournament = result?;
    print_standings(&tournament.final_standings);
    if let Some(champion) = tournament.final_standings.first() {
        info!(agent_id = %champion.agent_id, "Champion decided");
    } else {
        warn!("Tournament produced no standings");
    }
    Ok(())
}

fn print_standings(standings: &[TournamentStanding]) {
    println!("Final standings:");
    for s in standings {
        println!(
            "  {:>2}. {:<20} W{} L{} T{}  score {}",
            s.rank, s.agent_name, s.matches_won, s.matches_lost, s.matches_tied, s.total_score
        );
    }
}
