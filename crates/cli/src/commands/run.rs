//! `blockmind run`: Put the agent in the simulated world.

use std::path::PathBuf;
use std::sync::Arc;
use blockmind_agent::AgentBuilder;
use blockmind_config::AppConfig;
use blockmind_core::event::EventBus;
use blockmind_core::world::Position;
use blockmind_session::FileSessionStore;
use blockmind_world::{ConsoleFeed, SimWorld};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub load_memory: bool,
    pub init_message: Option<String>,
    pub user: String,
}

/// Run the agent until it shuts down. Returns the process exit code.
pub async fn run(args: RunArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = super::load_config(args.config.as_deref())?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    BLOCKMIND_API_KEY, OPENROUTER_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = blockmind_providers::router::build_provider(&config)?;
    let world = Arc::new(populate(&config, &args.user));
    let store = Arc::new(FileSessionStore::new(
        &config.history.resolved_session_dir(),
        &config.profile.name,
    ));

    println!("Blockmind: {} joins the world", config.profile.name);
    println!("   Model: {}", config.default_model);
    println!("   You are: {} (type `quit` to stop typing)", args.user);
    println!();

    // with peers around the agent only hears whispers from outsiders
    let console = ConsoleFeed::new(&args.user)
        .whispering(!config.profile.peers.is_empty())
        .spawn(world.feed());

    let events = Arc::new(EventBus::default());
    let mut feed = events.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => debug!(event = ?event, "Domain event"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut builder = AgentBuilder::new(config, world, provider)
        .with_store(store)
        .with_events(events)
        .load_memory(args.load_memory);
    if args.init_message.is_some() {
        builder = builder.init_message(args.init_message);
    }

    let reason = builder.build().run().await?;
    console.abort();
    watcher.abort();

    info!(reason = %reason, "Agent process ending");
    println!("\n{reason}");
    Ok(reason.exit_code())
}

/// The world the agent spawns into: the human user and any peers nearby.
fn populate(config: &AppConfig, user: &str) -> SimWorld {
    let mut world = SimWorld::new(&config.profile.name).with_player(user, Position::new(3.0, 64.0, 3.0));
    for (i, peer) in config.profile.peers.iter().enumerate() {
        world = world.with_player(peer, Position::new(-3.0 - i as f64, 64.0, 3.0));
    }
    world
}
