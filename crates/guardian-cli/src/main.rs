use std::env;
use std::path::{Path, PathBuf};

use contracts::{Archetype, OwnerId, Position, SecurityLevel};
use guardian_api::{load_config, GuardianApi, SqliteGuardianStore};
use guardian_core::sim::catalog::{KOBOLD_GEOMANCER, YOUNG_WOLF};
use guardian_core::{HostWorld, SimWorld};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK_MS: u32 = 100;

fn print_usage() {
    println!("guardian-cli <command>");
    println!("commands:");
    println!("  simulate <owner_id> [ticks] [sqlite_path]");
    println!("    captures a guardian, fights off attackers, relogs, and persists to sqlite");
    println!("  slots [sqlite_path]");
    println!("    prints every persisted guardian row as JSON");
    println!("  config [path]");
    println!("    prints the effective capture configuration as JSON");
}

fn default_sqlite_path() -> String {
    env::var("GUARDIAN_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "guardians.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn config_path() -> Option<PathBuf> {
    env::var("GUARDIAN_CONFIG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn run_simulation(args: &[String]) -> Result<(), String> {
    let owner_id = args
        .get(2)
        .ok_or_else(|| "missing owner_id".to_string())?;
    let owner_id = owner_id
        .parse::<u64>()
        .map(OwnerId)
        .map_err(|_| format!("invalid owner_id: {owner_id}"))?;
    let ticks = args
        .get(3)
        .map(|value| {
            value
                .parse::<u32>()
                .map_err(|_| format!("invalid ticks: {value}"))
        })
        .transpose()?
        .unwrap_or(600);
    let sqlite_path = parse_sqlite_path(args.get(4));

    let config = load_config(config_path().as_deref())
        .map_err(|err| format!("failed to load configuration: {err}"))?;

    let mut world = SimWorld::with_sample_catalog();
    let player = world.spawn_player("Wanderer", 20, Position::new(0, 0.0, 0.0, 0.0));
    let mut api = GuardianApi::new(world, config);
    api.attach_sqlite_store(PathBuf::from(&sqlite_path))
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;

    let session = api
        .login(owner_id, player, SecurityLevel::Player)
        .map_err(|err| err.to_string())?;
    let restored = session.guardians.occupied_count();

    if restored == 0 {
        let target = api
            .world_mut()
            .spawn_creature(KOBOLD_GEOMANCER, 18, Position::new(0, 6.0, 0.0, 0.0));
        let report = api.capture(owner_id, Some(target)).map_err(|err| err.to_string())?;
        print_messages(&report.messages);
        if !report.accepted {
            return Err("capture was refused".to_string());
        }
    }

    let mut attackers = 0;
    for tick in 0..ticks {
        if tick % 150 == 10 {
            let at = Position::new(0, 0.0, -8.0, 0.0);
            let wolf = api.world_mut().spawn_creature(YOUNG_WOLF, 12, at);
            if api.world_mut().attack(wolf, player) {
                attackers += 1;
            }
        }
        api.world_mut().advance(u64::from(TICK_MS));
        api.tick(TICK_MS);
        report_deaths(&mut api, owner_id);
    }

    if let Some(guardian) = api
        .session(owner_id)
        .and_then(|s| s.guardians.slot(0))
        .and_then(|slot| slot.active_handle())
    {
        let report = api
            .switch_archetype(owner_id, 0, Archetype::Healer, guardian)
            .map_err(|err| err.to_string())?;
        print_messages(&report.messages);
    }
    let report = api.info(owner_id, None).map_err(|err| err.to_string())?;
    print_messages(&report.messages);

    let saved = api.logout(owner_id).map_err(|err| err.to_string())?;
    let session = api
        .login(owner_id, player, SecurityLevel::Player)
        .map_err(|err| err.to_string())?;
    let active = session.guardians.active_count();
    let saved_again = api.logout(owner_id).map_err(|err| err.to_string())?;

    let packets = api.drain_sync();
    for (owner, message) in &packets {
        info!(owner = %owner, packet = %message.to_addon_packet(), "sync");
    }

    if let Some(error) = api.last_persistence_error() {
        return Err(format!("persistence error after simulation: {error}"));
    }

    println!(
        "simulated owner={} ticks={} restored={} attackers={} saved={} resummoned={} saved_again={} sync_messages={} sqlite={}",
        owner_id,
        ticks,
        restored,
        attackers,
        saved,
        active,
        saved_again,
        packets.len(),
        sqlite_path
    );
    Ok(())
}

/// `SimWorld` raises no death events of its own; forward them the way a host would.
fn report_deaths(api: &mut GuardianApi<SimWorld>, owner_id: OwnerId) {
    let dead = api
        .session(owner_id)
        .map(|session| {
            session
                .guardians
                .active_slots()
                .filter_map(|slot| slot.active_handle())
                .filter(|handle| api.world().unit(*handle).is_some_and(|unit| !unit.alive))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    for guardian in dead {
        warn!(guardian = %guardian, "guardian died during simulation");
        api.on_guardian_died(guardian);
    }
}

fn print_messages(messages: &[String]) {
    for message in messages {
        println!("{message}");
    }
}

fn dump_slots(path: &Path) -> Result<(), String> {
    let store = SqliteGuardianStore::open(path)
        .map_err(|err| format!("failed to open sqlite store: {err}"))?;
    let rows = store
        .load_all()
        .map_err(|err| format!("failed to read guardian rows: {err}"))?;
    let json = serde_json::to_string_pretty(&rows).map_err(|err| err.to_string())?;
    println!("{json}");
    Ok(())
}

fn print_config(path: Option<&Path>) -> Result<(), String> {
    let config = load_config(path).map_err(|err| err.to_string())?;
    let json = serde_json::to_string_pretty(&config).map_err(|err| err.to_string())?;
    println!("{json}");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("simulate") => run_simulation(&args),
        Some("slots") => dump_slots(Path::new(&parse_sqlite_path(args.get(2)))),
        Some("config") => {
            let path = args.get(2).map(PathBuf::from).or_else(config_path);
            print_config(path.as_deref())
        }
        _ => {
            print_usage();
            return;
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        print_usage();
        std::process::exit(2);
    }
}
