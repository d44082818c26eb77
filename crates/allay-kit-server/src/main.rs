mod config;
mod console;
mod host;
mod plugin_manager;
mod plugins;

use std::time::Duration;

use allay_kit_api::PluginEvent;
use config::ServerConfig;
use console::ConsoleCommand;
use host::{Delivery, Host};
use plugin_manager::PluginManager;
use plugins::Services;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

fn print_all(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        println!("{delivery}");
    }
}

/// Run one console line against the host and plugins.
/// Returns `false` when the server should stop.
fn handle_console(
    line: &str,
    host: &mut Host,
    manager: &mut PluginManager,
    services: &Services,
) -> bool {
    let command = match console::parse(line) {
        Ok(command) => command,
        Err(message) => {
            println!("{message}");
            return true;
        }
    };

    match command {
        ConsoleCommand::Stop => return false,
        ConsoleCommand::Help => {
            println!("{}", console::USAGE);
            for (name, description) in manager.command_help() {
                println!("  /{name}: {description}");
            }
        }
        ConsoleCommand::List => {
            let names = host.online_names();
            println!("{} online: {}", names.len(), names.join(", "));
        }
        ConsoleCommand::Join(name) => match host.join(&name) {
            Some((player, held)) => {
                info!("{} joined ({})", player.name, player.uuid);
                print_all(held);
                let actions = manager.handle_join(&player, &host.snapshot());
                let out = host.apply(actions);
                print_all(out);
            }
            None => println!("{name} is already online."),
        },
        ConsoleCommand::Quit(name) => {
            let Some(player) = host.online_player(&name) else {
                println!("{name} is not online.");
                return true;
            };
            // Plugins still see the player online while handling the quit.
            let snapshot = host.snapshot();
            host.quit(&name);
            info!("{} left", player.name);
            let actions = manager.handle_quit(&player, &snapshot);
            let out = host.apply(actions);
            print_all(out);
        }
        ConsoleCommand::As {
            player,
            command,
            args,
        } => {
            let Some(sender) = host.online_player(&player) else {
                println!("{player} is not online.");
                return true;
            };
            match manager.handle_command(&command, &args, &sender, &host.snapshot()) {
                Some((result, actions)) => {
                    for message in &result.messages {
                        println!("[-> {}] {message}", sender.name);
                    }
                    let out = host.apply(actions);
                    print_all(out);
                }
                None => println!("Unknown command: /{command}"),
            }
        }
        ConsoleCommand::Kill { victim, killer } => {
            let Some(victim) = host.online_player(&victim) else {
                println!("{victim} is not online.");
                return true;
            };
            let killer = killer.and_then(|k| host.online_player(&k));
            let event = PluginEvent::PlayerDeath { player: victim, killer };
            let actions = manager.dispatch(&event, &host.snapshot());
            let out = host.apply(actions);
            print_all(out);
        }
        ConsoleCommand::Move { player, location } => {
            if !host.move_player(&player, location) {
                println!("Cannot move {player}: not online or unknown dimension.");
            }
        }
        ConsoleCommand::Give {
            player,
            item,
            count,
        } => match services.items.create(&item, count) {
            Ok(stack) => {
                let label = stack.to_string();
                let identifier = stack.identifier.clone();
                if host.give(&player, stack) {
                    let held = host.item_count(&player, &identifier);
                    println!("Gave {label} to {player} (now {held}).");
                } else {
                    println!("Unknown player: {player}");
                }
            }
            Err(e) => println!("{e}"),
        },
        ConsoleCommand::Inventory(name) => {
            let Some(at) = host.location_of(&name) else {
                println!("Unknown player: {name}");
                return true;
            };
            let items: Vec<String> = host
                .inventory_of(&name)
                .iter()
                .map(ToString::to_string)
                .collect();
            let items = if items.is_empty() {
                "empty".to_string()
            } else {
                items.join(", ")
            };
            println!(
                "{name} at {:.1} {:.1} {:.1} in {}: {items}",
                at.x, at.y, at.z, at.dimension
            );
        }
    }
    true
}

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load_or_default("server.toml") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load server.toml: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("allay-kit v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", config.storage.data_dir.display());

    let services = Services::open(&config);
    let mut manager = PluginManager::new(services.hook.clone(), config.storage.data_dir.join("config"));
    for plugin in plugins::build_plugins(&services, &config) {
        manager.register(plugin);
    }
    manager.load_configs();

    let mut host = Host::new(config.world.dimensions.clone(), config.world.spawn);
    let startup = manager.enable_all(&host.snapshot());
    print_all(host.apply(startup));
    let started = manager.dispatch(&PluginEvent::ServerStarted, &host.snapshot());
    print_all(host.apply(started));
    info!("{} plugins enabled. Type 'help' for console commands.", manager.plugin_count());

    let (console_tx, mut console_rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut tick_interval =
        tokio::time::interval(Duration::from_millis(config.scheduler.tick_millis.max(1)));
    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                host.advance_tick();
                let actions = manager.tick_scheduler(&host.snapshot());
                print_all(host.apply(actions));
            }
            line = console_rx.recv() => {
                match line {
                    Some(line) => {
                        if !handle_console(&line, &mut host, &mut manager, &services) {
                            info!("Stop requested from console");
                            break;
                        }
                    }
                    None => {
                        warn!("Console closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // End every open session so pending writes are flushed and transient
    // state is settled before the final save.
    for name in host.online_names() {
        if let Some(player) = host.online_player(&name) {
            let snapshot = host.snapshot();
            host.quit(&name);
            let actions = manager.handle_quit(&player, &snapshot);
            print_all(host.apply(actions));
        }
    }
    let stopping = manager.dispatch(&PluginEvent::ServerStopping, &host.snapshot());
    print_all(host.apply(stopping));
    manager.disable_all();
    info!("Saving data before shutdown...");
    services.flush_all();
    info!("Server shut down.");
}
