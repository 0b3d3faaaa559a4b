//! Command registry: the closed set of commands known at startup.
//!
//! Every command is a [`CommandId`] variant with a static definition
//! (name, description, typed parameters). The registry maps names to
//! definitions, minus any commands blocked for this agent; a blocked command
//! does not exist as far as the model is concerned.

use std::collections::HashMap;
use blockmind_core::error::CommandError;
use crate::grammar::ArgValue;

/// Every built-in command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    // queries
    Stats,
    Inventory,
    NearbyBlocks,
    Entities,
    SavedPlaces,
    Help,
    // control
    Stop,
    Stfu,
    Goal,
    EndGoal,
    RememberHere,
    // actions
    GoTo,
    GoToPlayer,
    FollowPlayer,
    GoToPlace,
    CollectBlocks,
    CraftRecipe,
    PlaceHere,
    Attack,
    GivePlayer,
    MoveAway,
    Stay,
}

/// Broad command category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Synchronous; returns a result immediately.
    Query,
    /// Changes the agent's own state.
    Control,
    /// Long-running; runs on the action manager.
    Action,
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Bool,
    String,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

const fn int(name: &'static str, min: i64, max: i64, description: &'static str) -> ParamSpec {
    ParamSpec { name, kind: ParamKind::Int { min, max }, description }
}

const fn float(name: &'static str, min: f64, max: f64, description: &'static str) -> ParamSpec {
    ParamSpec { name, kind: ParamKind::Float { min, max }, description }
}

const fn string(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec { name, kind: ParamKind::String, description }
}

/// Static definition of a command.
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub id: CommandId,
    pub name: &'static str,
    pub kind: CommandKind,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl CommandId {
    pub const ALL: [CommandId; 22] = [
        CommandId::Stats,
        CommandId::Inventory,
        CommandId::NearbyBlocks,
        CommandId::Entities,
        CommandId::SavedPlaces,
        CommandId::Help,
        CommandId::Stop,
        CommandId::Stfu,
        CommandId::Goal,
        CommandId::EndGoal,
        CommandId::RememberHere,
        CommandId::GoTo,
        CommandId::GoToPlayer,
        CommandId::FollowPlayer,
        CommandId::GoToPlace,
        CommandId::CollectBlocks,
        CommandId::CraftRecipe,
        CommandId::PlaceHere,
        CommandId::Attack,
        CommandId::GivePlayer,
        CommandId::MoveAway,
        CommandId::Stay,
    ];

    pub fn definition(self) -> CommandDef {
        use CommandKind::*;
        let (name, kind, description, params): (_, _, _, &'static [ParamSpec]) = match self {
            CommandId::Stats => ("!stats", Query, "Get your bot's location, health, hunger, and time of day.", NO_PARAMS),
            CommandId::Inventory => ("!inventory", Query, "Get your bot's inventory.", NO_PARAMS),
            CommandId::NearbyBlocks => ("!nearbyBlocks", Query, "Get the blocks near the bot.", NO_PARAMS),
            CommandId::Entities => ("!entities", Query, "Get the nearby players and entities.", NO_PARAMS),
            CommandId::SavedPlaces => ("!savedPlaces", Query, "List all saved locations.", NO_PARAMS),
            CommandId::Help => ("!help", Query, "Lists all available commands and their descriptions.", NO_PARAMS),
            CommandId::Stop => (
                "!stop",
                Control,
                "Force stop all actions and commands that are currently executing.",
                NO_PARAMS,
            ),
            CommandId::Stfu => (
                "!stfu",
                Control,
                "Stop all chatting and self prompting, but continue current action.",
                NO_PARAMS,
            ),
            CommandId::Goal => (
                "!goal",
                Control,
                "Set a goal prompt to endlessly work towards with continuous self-prompting.",
                GOAL_PARAMS,
            ),
            CommandId::EndGoal => (
                "!endGoal",
                Control,
                "Call when you have accomplished your goal. It will stop self-prompting and the current action.",
                NO_PARAMS,
            ),
            CommandId::RememberHere => (
                "!rememberHere",
                Control,
                "Save the current location with a given name.",
                REMEMBER_PARAMS,
            ),
            CommandId::GoTo => ("!goTo", Action, "Go to the given x, y, z location.", GO_TO_PARAMS),
            CommandId::GoToPlayer => ("!goToPlayer", Action, "Go to the given player.", GO_TO_PLAYER_PARAMS),
            CommandId::FollowPlayer => (
                "!followPlayer",
                Action,
                "Endlessly follow the given player.",
                FOLLOW_PARAMS,
            ),
            CommandId::GoToPlace => ("!goToPlace", Action, "Go to a saved location.", GO_TO_PLACE_PARAMS),
            CommandId::CollectBlocks => (
                "!collectBlocks",
                Action,
                "Collect the nearest blocks of a given type.",
                COLLECT_PARAMS,
            ),
            CommandId::CraftRecipe => (
                "!craftRecipe",
                Action,
                "Craft the given recipe a given number of times.",
                CRAFT_PARAMS,
            ),
            CommandId::PlaceHere => (
                "!placeHere",
                Action,
                "Place a given block in the current location.",
                PLACE_PARAMS,
            ),
            CommandId::Attack => (
                "!attack",
                Action,
                "Attack and kill the nearest entity of a given type.",
                ATTACK_PARAMS,
            ),
            CommandId::GivePlayer => (
                "!givePlayer",
                Action,
                "Give the specified item to the given player.",
                GIVE_PARAMS,
            ),
            CommandId::MoveAway => (
                "!moveAway",
                Action,
                "Move away from the current location in any direction by a given distance.",
                MOVE_AWAY_PARAMS,
            ),
            CommandId::Stay => (
                "!stay",
                Action,
                "Stay in the current location no matter what. Pauses all modes.",
                NO_PARAMS,
            ),
        };
        CommandDef { id: self, name, kind, description, params }
    }
}

const COUNT_MAX: i64 = u32::MAX as i64;

const NO_PARAMS: &[ParamSpec] = &[];
const GOAL_PARAMS: &[ParamSpec] = &[string("selfPrompt", "The goal prompt.")];
const REMEMBER_PARAMS: &[ParamSpec] = &[string("name", "The name to remember the location as.")];
const GO_TO_PARAMS: &[ParamSpec] = &[
    float("x", f64::MIN, f64::MAX, "The x coordinate."),
    float("y", -64.0, 320.0, "The y coordinate."),
    float("z", f64::MIN, f64::MAX, "The z coordinate."),
];
const GO_TO_PLAYER_PARAMS: &[ParamSpec] = &[
    string("player_name", "The name of the player to go to."),
    float("closeness", 0.0, f64::MAX, "How close to get to the player."),
];
const FOLLOW_PARAMS: &[ParamSpec] = &[
    string("player_name", "Name of the player to follow."),
    float("follow_dist", 0.0, f64::MAX, "The distance to follow from."),
];
const GO_TO_PLACE_PARAMS: &[ParamSpec] = &[string("name", "The name of the location to go to.")];
const COLLECT_PARAMS: &[ParamSpec] = &[
    string("type", "The block type to collect."),
    int("num", 1, COUNT_MAX, "The number of blocks to collect."),
];
const CRAFT_PARAMS: &[ParamSpec] = &[
    string("recipe_name", "The name of the output item to craft."),
    int("num", 1, COUNT_MAX, "The number of times to craft the recipe."),
];
const PLACE_PARAMS: &[ParamSpec] = &[string("type", "The block type to place.")];
const ATTACK_PARAMS: &[ParamSpec] = &[string("type", "The type of entity to attack.")];
const GIVE_PARAMS: &[ParamSpec] = &[
    string("player_name", "The name of the player to give the item to."),
    string("item_name", "The name of the item to give."),
    int("num", 1, COUNT_MAX, "The number of items to give."),
];
const MOVE_AWAY_PARAMS: &[ParamSpec] = &[float("distance", 0.0, f64::MAX, "The distance to move away.")];

impl CommandDef {
    /// Check `args` against the declared parameters, coercing integers to
    /// floats where a float is expected.
    pub fn bind(&self, args: &[ArgValue]) -> Result<Vec<ArgValue>, CommandError> {
        if args.len() != self.params.len() {
            return Err(self.invalid(format!(
                "was given {} args, but requires {} args",
                args.len(),
                self.params.len()
            )));
        }

        self.params
            .iter()
            .zip(args)
            .map(|(param, arg)| self.bind_one(param, arg))
            .collect()
    }

    fn bind_one(&self, param: &ParamSpec, arg: &ArgValue) -> Result<ArgValue, CommandError> {
        let mismatch = || {
            self.invalid(format!(
                "param '{}' must be of type {}, got {}",
                param.name,
                kind_name(&param.kind),
                arg.type_name()
            ))
        };

        match (param.kind, arg) {
            (ParamKind::Int { min, max }, ArgValue::Int(v)) => {
                if *v < min || *v > max {
                    return Err(self.out_of_range(param, &v.to_string()));
                }
                Ok(ArgValue::Int(*v))
            }
            (ParamKind::Float { min, max }, ArgValue::Int(v)) => {
                let v = *v as f64;
                if v < min || v > max {
                    return Err(self.out_of_range(param, &v.to_string()));
                }
                Ok(ArgValue::Float(v))
            }
            (ParamKind::Float { min, max }, ArgValue::Float(v)) => {
                if *v < min || *v > max {
                    return Err(self.out_of_range(param, &v.to_string()));
                }
                Ok(ArgValue::Float(*v))
            }
            (ParamKind::Bool, ArgValue::Bool(v)) => Ok(ArgValue::Bool(*v)),
            (ParamKind::String, ArgValue::Str(s)) => Ok(ArgValue::Str(s.clone())),
            (ParamKind::Enum(options), ArgValue::Str(s)) => {
                if options.contains(&s.as_str()) {
                    Ok(ArgValue::Str(s.clone()))
                } else {
                    Err(self.invalid(format!(
                        "param '{}' must be one of: {}",
                        param.name,
                        options.join(", ")
                    )))
                }
            }
            _ => Err(mismatch()),
        }
    }

    fn out_of_range(&self, param: &ParamSpec, value: &str) -> CommandError {
        self.invalid(format!("param '{}' is out of range ({value})", param.name))
    }

    fn invalid(&self, reason: String) -> CommandError {
        CommandError::InvalidArguments {
            name: self.name.to_string(),
            reason,
        }
    }

    /// Documentation block for the system prompt.
    pub fn docs(&self) -> String {
        let mut doc = format!("{}: {}\n", self.name, self.description);
        if !self.params.is_empty() {
            doc.push_str("Params:\n");
            for p in self.params {
                doc.push_str(&format!("{}: ({}) {}\n", p.name, kind_name(&p.kind), p.description));
            }
        }
        doc
    }
}

fn kind_name(kind: &ParamKind) -> &'static str {
    match kind {
        ParamKind::Int { .. } => "number",
        ParamKind::Float { .. } => "number",
        ParamKind::Bool => "bool",
        ParamKind::String => "string",
        ParamKind::Enum(_) => "string",
    }
}

/// Name → definition map built once at startup.
pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandDef>,
    /// Registration order, for stable docs
    order: Vec<&'static str>,
}

impl CommandRegistry {
    /// All built-in commands except those named in `blocked`.
    pub fn builtin<S: AsRef<str>>(blocked: &[S]) -> Self {
        let mut commands = HashMap::new();
        let mut order = Vec::new();
        for id in CommandId::ALL {
            let def = id.definition();
            if blocked.iter().any(|b| b.as_ref() == def.name) {
                tracing::debug!(command = def.name, "Command blocked");
                continue;
            }
            order.push(def.name);
            commands.insert(def.name, def);
        }
        Self { commands, order }
    }

    pub fn get(&self, name: &str) -> Option<&CommandDef> {
        self.commands.get(name)
    }

    /// Whether `name` (with the `!` marker) is a usable command.
    pub fn exists(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    /// Rendered docs for every registered command.
    pub fn docs(&self) -> String {
        let mut docs = String::from(
            "\n*COMMAND DOCS\n You can use the following commands to perform actions and get information \
about the world. Use the commands with the syntax: !commandName or !commandName(\"arg1\", 1.2, ...) \
if the command takes arguments.\n Do not use codeblocks. Use double quotes for strings. Only use one \
command in each response, trailing commands and comments will be ignored.\n",
        );
        for name in &self.order {
            if let Some(def) = self.commands.get(name) {
                docs.push_str(&def.docs());
            }
        }
        docs.push_str("*\n");
        docs
    }
}
