//! Built-in command implementations.

use std::time::Duration;
use blockmind_core::error::CommandError;
use blockmind_core::world::{Inventory, WorldAction};
use crate::actions::ActionRequest;
use crate::dispatcher::{AgentHandle, CommandDispatcher};
use crate::grammar::ArgValue;
use crate::registry::{CommandDef, CommandId};

/// Run a bound command.
pub(crate) async fn run(
    def: &CommandDef,
    args: &[ArgValue],
    agent: &mut dyn AgentHandle,
    dispatcher: &CommandDispatcher,
) -> Result<Option<String>, CommandError> {
    let fail = |reason: String| CommandError::Execution {
        name: def.name.to_string(),
        reason,
    };
    let world = agent.world();
    let actions = agent.actions().clone();

    let action = match def.id {
        CommandId::Stats => {
            return world.stats().await.map(Some).map_err(|e| fail(e.to_string()));
        }
        CommandId::Inventory => {
            let inventory = world.inventory().await.map_err(|e| fail(e.to_string()))?;
            return Ok(Some(render_inventory(&inventory)));
        }
        CommandId::NearbyBlocks => {
            let blocks = world.nearby_blocks().await.map_err(|e| fail(e.to_string()))?;
            let items: Vec<String> = blocks.iter().map(|b| format!("- {b}")).collect();
            return Ok(Some(bulleted("NEARBY_BLOCKS", &items)));
        }
        CommandId::Entities => {
            let entities = world.nearby_entities().await.map_err(|e| fail(e.to_string()))?;
            let items: Vec<String> = entities.iter().map(|e| format!("- {e}")).collect();
            return Ok(Some(bulleted("NEARBY_ENTITIES", &items)));
        }
        CommandId::SavedPlaces => {
            return Ok(Some(format!(
                "Saved place names: {}",
                agent.saved_place_names().join(", ")
            )));
        }
        CommandId::Help => return Ok(Some(dispatcher.command_docs())),

        CommandId::Stop => {
            actions.stop().await.map_err(|e| fail(e.to_string()))?;
            agent.clear_behavior_log();
            actions.cancel_resume();
            let mut msg = String::from("Agent stopped.");
            if agent.self_prompt_active() {
                msg.push_str(" Self-prompting still active.");
            }
            return Ok(Some(msg));
        }
        CommandId::Stfu => {
            world.chat("Shutting up.").await.map_err(|e| fail(e.to_string()))?;
            agent.shut_up();
            agent.stop_self_prompt(true).await.map_err(|e| fail(e.to_string()))?;
            return Ok(None);
        }
        CommandId::Goal => {
            agent.start_self_prompt(string_arg(def, args, 0)?);
            return Ok(None);
        }
        CommandId::EndGoal => {
            agent.stop_self_prompt(false).await.map_err(|e| fail(e.to_string()))?;
            return Ok(Some("Self-prompting stopped.".into()));
        }
        CommandId::RememberHere => {
            let name = string_arg(def, args, 0)?;
            let position = world.position().await.map_err(|e| fail(e.to_string()))?;
            agent.remember_place(name.clone(), position);
            return Ok(Some(format!("Location saved as \"{name}\".")));
        }

        CommandId::GoTo => WorldAction::GoTo {
            x: float_arg(def, args, 0)?,
            y: float_arg(def, args, 1)?,
            z: float_arg(def, args, 2)?,
        },
        CommandId::GoToPlayer => WorldAction::GoToPlayer {
            player: string_arg(def, args, 0)?,
            closeness: float_arg(def, args, 1)?,
        },
        CommandId::FollowPlayer => WorldAction::FollowPlayer {
            player: string_arg(def, args, 0)?,
            distance: float_arg(def, args, 1)?,
        },
        CommandId::GoToPlace => {
            let name = string_arg(def, args, 0)?;
            let place = agent
                .saved_place(&name)
                .ok_or_else(|| fail(format!("No location named \"{name}\" saved.")))?;
            WorldAction::GoTo {
                x: place.x,
                y: place.y,
                z: place.z,
            }
        }
        CommandId::CollectBlocks => WorldAction::CollectBlocks {
            block: string_arg(def, args, 0)?,
            count: count_arg(def, args, 1)?,
        },
        CommandId::CraftRecipe => WorldAction::CraftRecipe {
            item: string_arg(def, args, 0)?,
            count: count_arg(def, args, 1)?,
        },
        CommandId::PlaceHere => WorldAction::PlaceHere {
            block: string_arg(def, args, 0)?,
        },
        CommandId::Attack => WorldAction::Attack {
            entity: string_arg(def, args, 0)?,
        },
        CommandId::GivePlayer => WorldAction::GivePlayer {
            player: string_arg(def, args, 0)?,
            item: string_arg(def, args, 1)?,
            count: count_arg(def, args, 2)?,
        },
        CommandId::MoveAway => WorldAction::MoveAway {
            distance: float_arg(def, args, 0)?,
        },
        CommandId::Stay => WorldAction::Stay,
    };

    let continuous = action.is_continuous();
    let request = ActionRequest {
        label: format!("action:{}", def.name.trim_start_matches('!')),
        resume: def.id == CommandId::FollowPlayer,
        timeout: action_timeout(continuous, dispatcher.action_timeout()),
        action,
        origin: agent.action_origin(),
    };

    actions.launch(request).await.map_err(|e| fail(e.to_string()))?;
    Ok(None)
}

/// The `!inventory` listing, also used to fill `$INVENTORY` in prompts.
pub fn render_inventory(inventory: &Inventory) -> String {
    let items: Vec<String> = inventory
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(item, count)| format!("- {item}: {count}"))
        .collect();
    bulleted("INVENTORY", &items)
}

fn action_timeout(continuous: bool, timeout: Option<Duration>) -> Option<Duration> {
    if continuous { None } else { timeout }
}

fn bulleted(header: &str, items: &[String]) -> String {
    if items.is_empty() {
        format!("{header}: none\n")
    } else {
        format!("{header}\n{}\n", items.join("\n"))
    }
}

fn arg_error(def: &CommandDef, index: usize) -> CommandError {
    CommandError::InvalidArguments {
        name: def.name.to_string(),
        reason: format!("missing or mistyped argument {}", index + 1),
    }
}

fn string_arg(def: &CommandDef, args: &[ArgValue], index: usize) -> Result<String, CommandError> {
    match args.get(index) {
        Some(ArgValue::Str(s)) => Ok(s.clone()),
        _ => Err(arg_error(def, index)),
    }
}

fn float_arg(def: &CommandDef, args: &[ArgValue], index: usize) -> Result<f64, CommandError> {
    match args.get(index) {
        Some(ArgValue::Float(v)) => Ok(*v),
        Some(ArgValue::Int(v)) => Ok(*v as f64),
        _ => Err(arg_error(def, index)),
    }
}

fn count_arg(def: &CommandDef, args: &[ArgValue], index: usize) -> Result<u32, CommandError> {
    match args.get(index) {
        Some(ArgValue::Int(v)) => u32::try_from(*v).map_err(|_| arg_error(def, index)),
        _ => Err(arg_error(def, index)),
    }
}
