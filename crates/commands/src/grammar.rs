//! Command grammar: how commands appear inside model output.
//!
//! A command is a `!` marker that is not preceded by a word character,
//! followed by a name (`[a-zA-Z]\w*`) and an optional argument list of
//! literals: numbers, `true`/`false`, or double-quoted strings.
//!
//! ```text
//! Sure! !collectBlocks("oak_log", 4)
//!       ^^^^^^^^^^^^^^^^^^^^^^^^^^^^ invocation
//! ```

use regex_lite::Regex;
use std::sync::LazyLock;

const LITERAL: &str = r#"-?\d+(?:\.\d+)?|true|false|"[^"]*""#;

static COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?:^|[^A-Za-z0-9_])!([A-Za-z][A-Za-z0-9_]*)(\(\s*(?:(?:{LITERAL})(?:\s*,\s*(?:{LITERAL}))*)?\s*\))?"
    );
    Regex::new(&pattern).expect("command grammar is a valid pattern")
});

static ARGUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(LITERAL).expect("argument grammar is a valid pattern"));

/// A literal argument as written in model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ArgValue {
    fn parse(literal: &str) -> Option<Self> {
        match literal {
            "true" => Some(ArgValue::Bool(true)),
            "false" => Some(ArgValue::Bool(false)),
            s if s.starts_with('"') => Some(ArgValue::Str(s.trim_matches('"').to_string())),
            s if s.contains('.') => s.parse().ok().map(ArgValue::Float),
            s => s.parse().ok().map(ArgValue::Int),
        }
    }

    /// Name of the literal's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Int(_) => "integer",
            ArgValue::Float(_) => "float",
            ArgValue::Bool(_) => "boolean",
            ArgValue::Str(_) => "string",
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v}"),
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Str(v) => write!(f, "\"{v}\""),
        }
    }
}

/// A parsed command occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Name including the `!` marker, e.g. `!goTo`
    pub name: String,
    pub args: Vec<ArgValue>,
    /// Byte offset of the `!` marker
    pub start: usize,
    /// Byte offset just past the invocation
    pub end: usize,
}

/// Locate the first command in `text`.
pub fn find_command(text: &str) -> Option<Invocation> {
    let caps = COMMAND.captures(text)?;
    let name = caps.get(1)?;
    let end = caps.get(0)?.end();
    let args = caps
        .get(2)
        .map(|list| {
            ARGUMENT
                .find_iter(list.as_str())
                .filter_map(|m| ArgValue::parse(m.as_str()))
                .collect()
        })
        .unwrap_or_default();

    Some(Invocation {
        name: format!("!{}", name.as_str()),
        args,
        start: name.start() - 1,
        end,
    })
}

/// The name (with marker) of the first command in `text`, if any.
pub fn contains_command(text: &str) -> Option<String> {
    find_command(text).map(|inv| inv.name)
}

/// Cut everything after the first command's argument list.
pub fn truncate(text: &str) -> &str {
    match find_command(text) {
        Some(inv) => &text[..inv.end],
        None => text,
    }
}

/// Split `text` into the prose before the first command and the invocation.
///
/// The prose is trimmed of whitespace and code-fence backticks.
pub fn split_message(text: &str) -> Option<(String, Invocation)> {
    let inv = find_command(text)?;
    let pre = text[..inv.start]
        .trim_matches(|c: char| c.is_whitespace() || c == '`')
        .to_string();
    Some((pre, inv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_bare_command() {
        assert_eq!(contains_command("!stats"), Some("!stats".into()));
        assert_eq!(contains_command("let me check !inventory"), Some("!inventory".into()));
    }

    #[test]
    fn marker_must_not_follow_a_word_character() {
        assert_eq!(contains_command("Hello!stats"), None);
        assert_eq!(contains_command("wow!!stats"), Some("!stats".into()));
        assert_eq!(contains_command("(!stats)"), Some("!stats".into()));
    }

    #[test]
    fn name_must_start_with_a_letter() {
        assert_eq!(contains_command("!1abc"), None);
        assert_eq!(contains_command("I said ! stats"), None);
        assert_eq!(contains_command("hi!"), None);
    }

    #[test]
    fn parses_typed_arguments() {
        let inv = find_command(r#"!givePlayer("steve", "oak_log", 3)"#).unwrap();
        assert_eq!(inv.name, "!givePlayer");
        assert_eq!(
            inv.args,
            vec![
                ArgValue::Str("steve".into()),
                ArgValue::Str("oak_log".into()),
                ArgValue::Int(3),
            ]
        );

        let inv = find_command("!goTo(-12.5, 64, 3)").unwrap();
        assert_eq!(
            inv.args,
            vec![ArgValue::Float(-12.5), ArgValue::Int(64), ArgValue::Int(3)]
        );

        let inv = find_command("!setMode(\"hunting\", false)").unwrap();
        assert_eq!(inv.args[1], ArgValue::Bool(false));
    }

    #[test]
    fn strings_may_hold_commas() {
        let inv = find_command(r#"!goal("mine stone, then craft a pickaxe")"#).unwrap();
        assert_eq!(inv.args, vec![ArgValue::Str("mine stone, then craft a pickaxe".into())]);
    }

    #[test]
    fn malformed_argument_list_is_not_consumed() {
        let inv = find_command("!goTo(north)").unwrap();
        assert_eq!(inv.name, "!goTo");
        assert!(inv.args.is_empty());
        assert_eq!(inv.end, "!goTo".len());
    }

    #[test]
    fn truncate_drops_text_after_arguments() {
        assert_eq!(
            truncate(r#"On it! !collectBlocks("stone", 5) and then I'll build"#),
            r#"On it! !collectBlocks("stone", 5)"#
        );
        assert_eq!(truncate("just talking"), "just talking");
    }

    #[test]
    fn split_trims_prose_and_fences() {
        let (pre, inv) =
            split_message("Sure, mining now ```!collectBlocks(\"stone\",5)``` then extra text").unwrap();
        assert_eq!(pre, "Sure, mining now");
        assert_eq!(inv.name, "!collectBlocks");
        assert_eq!(inv.args, vec![ArgValue::Str("stone".into()), ArgValue::Int(5)]);

        let (pre, _) = split_message("!stats").unwrap();
        assert!(pre.is_empty());
    }

    #[test]
    fn only_the_first_command_counts() {
        let inv = find_command("!stats then !inventory").unwrap();
        assert_eq!(inv.name, "!stats");
    }
}
