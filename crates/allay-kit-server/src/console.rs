//! Console line parsing.

use allay_kit_api::PluginLocation;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Join(String),
    Quit(String),
    /// Run a plugin command as a player: `as Steve home set base`.
    As {
        player: String,
        command: String,
        args: Vec<String>,
    },
    Kill {
        victim: String,
        killer: Option<String>,
    },
    Move {
        player: String,
        location: PluginLocation,
    },
    Give {
        player: String,
        item: String,
        count: u32,
    },
    Inventory(String),
    List,
    Help,
    Stop,
}

pub const USAGE: &str = "\
join <name> | quit <name> | as <name> <command> [args...] | kill <victim> [killer]
move <name> <x> <y> <z> [dimension] | give <name> <item> [count] | inv <name>
list | help | stop";

fn coord(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Invalid coordinate: {value}"))
}

pub fn parse(line: &str) -> Result<ConsoleCommand, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, rest)) = parts.split_first() else {
        return Err("Empty command".into());
    };
    let name = |i: usize, what: &str| {
        rest.get(i)
            .map(|s| s.to_string())
            .ok_or_else(|| format!("Usage: {head} {what}"))
    };

    match head.to_lowercase().as_str() {
        "join" => Ok(ConsoleCommand::Join(name(0, "<name>")?)),
        "quit" => Ok(ConsoleCommand::Quit(name(0, "<name>")?)),
        "as" => {
            let player = name(0, "<name> <command> [args...]")?;
            let command = name(1, "<name> <command> [args...]")?;
            Ok(ConsoleCommand::As {
                player,
                command: command.trim_start_matches('/').to_lowercase(),
                args: rest[2..].iter().map(|s| s.to_string()).collect(),
            })
        }
        "kill" => Ok(ConsoleCommand::Kill {
            victim: name(0, "<victim> [killer]")?,
            killer: rest.get(1).map(|s| s.to_string()),
        }),
        "move" | "tp" => {
            if rest.len() < 4 {
                return Err(format!("Usage: {head} <name> <x> <y> <z> [dimension]"));
            }
            let dimension = rest.get(4).copied().unwrap_or("overworld");
            Ok(ConsoleCommand::Move {
                player: rest[0].to_string(),
                location: PluginLocation::new(
                    coord(rest[1])?,
                    coord(rest[2])?,
                    coord(rest[3])?,
                    dimension,
                ),
            })
        }
        "give" => {
            let player = name(0, "<name> <item> [count]")?;
            let item = name(1, "<name> <item> [count]")?;
            let count = match rest.get(2) {
                Some(c) => c.parse().map_err(|_| format!("Invalid count: {c}"))?,
                None => 1,
            };
            Ok(ConsoleCommand::Give {
                player,
                item,
                count,
            })
        }
        "inv" | "inventory" => Ok(ConsoleCommand::Inventory(name(0, "<name>")?)),
        "list" => Ok(ConsoleCommand::List),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "stop" => Ok(ConsoleCommand::Stop),
        other => Err(format!("Unknown console command: {other}. Type 'help'.")),
    }
}
