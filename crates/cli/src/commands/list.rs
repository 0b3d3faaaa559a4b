//! `blockmind commands`: Print the command docs the model sees.

use std::path::PathBuf;
use blockmind_commands::CommandRegistry;

pub async fn run(config: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config.as_deref())?;
    let blocked = config.blocked_commands();
    let registry = CommandRegistry::builtin(&blocked);

    println!("Commands available to {}:\n", config.profile.name);
    println!("{}", registry.docs());
    if !blocked.is_empty() {
        println!("Blocked by the task: {}", blocked.join(", "));
    }
    Ok(())
}
