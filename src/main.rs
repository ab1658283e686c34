//! Dogfight Match Server
//!
//! Runs one match simulation on a tokio task until Ctrl+C. With
//! `--demo`, plays a scripted match twice and checks both runs end with
//! the same world digest.

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use dogfight::{
    EntityId, InboundEvent, PlayerProfile, ServerConfig, Simulation, Team, VERSION,
    game::specs::{ProjectileKind, ShipType},
    runtime,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    init_tracing(&config.log_level)?;

    info!("Dogfight Server v{}", VERSION);
    info!(
        mode = ?config.mode,
        kill_assists = config.kill_assists,
        seed = config.rng_seed,
        "Configuration loaded"
    );

    if std::env::args().any(|arg| arg == "--demo") {
        demo_match(&config);
        return Ok(());
    }

    let (handle, join) = runtime::spawn(config);

    // Outbound events would go to the broadcast layer; log them here
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => debug!(target: "outbound", "{}", json),
                Err(e) => warn!(error = %e, "Failed to encode outbound event"),
            }
        }
    });

    shutdown_signal().await;

    handle.shutdown().await?;
    join.await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Scripted match fed to a fresh simulation.
fn scripted_match(config: &ServerConfig) -> Simulation {
    let mut sim = Simulation::new(config.clone());

    for id in 1..=6u32 {
        sim.handle(InboundEvent::PlayerJoined {
            player_id: EntityId(id),
            profile: PlayerProfile {
                name: format!("pilot{}", id),
                is_bot: id > 4,
                ship_type: ShipType::from_index((id % 5 + 1) as u8).unwrap_or_default(),
            },
        });
    }

    let mut now_ms = 0;
    let mut next_missile = 1000;

    for second in 0..240u32 {
        now_ms += 1000;
        sim.advance_to(now_ms);
        sim.handle(InboundEvent::ClockSecondElapsed);

        let snapshot = sim.snapshot();
        let living: Vec<_> = snapshot.players.iter().filter(|p| p.alive).collect();
        let red = living.iter().find(|p| p.team == Team::Red).map(|p| p.id);
        let blue = living.iter().find(|p| p.team == Team::Blue).map(|p| p.id);

        if let (Some(red), Some(blue)) = (red, blue) {
            // Red rams, blue shoots back
            sim.handle(InboundEvent::HitOccurred {
                victim_id: blue,
                source_id: red,
                flat_damage: 0.0,
            });

            next_missile += 1;
            let missile = EntityId(next_missile);
            sim.handle(InboundEvent::ProjectileLaunched {
                projectile_id: missile,
                owner_id: blue,
                kind: ProjectileKind::PredatorMissile,
            });
            if second % 3 == 0 {
                sim.handle(InboundEvent::ProjectileRepelled { projectile_id: missile });
            }
            sim.handle(InboundEvent::HitOccurred {
                victim_id: red,
                source_id: missile,
                flat_damage: 0.0,
            });
            sim.handle(InboundEvent::ProjectileExpired { projectile_id: missile });
        }

        for event in sim.take_events() {
            if let Ok(json) = serde_json::to_string(&event) {
                debug!(target: "outbound", "{}", json);
            }
        }
    }

    sim
}

/// Run the scripted match twice and compare digests.
fn demo_match(config: &ServerConfig) {
    info!("=== Starting Demo Match ===");

    let first = scripted_match(config);
    let record = &first.world().match_record;
    info!(
        matches = record.sequence,
        winner = ?record.winner,
        "Demo finished"
    );

    for player in first.world().players.values() {
        info!(
            "{:>8} {:?}: {} kills, {} assists, {} deaths, {} damage",
            player.name,
            player.team,
            player.kills.total,
            player.kills.assists,
            player.deaths.total,
            player.damage.dealt
        );
    }

    let hash = first.world().compute_hash();
    info!("Final State Hash: {}", hex::encode(hash));

    info!("=== Verifying Determinism ===");
    let replay_hash = scripted_match(config).world().compute_hash();
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash == replay_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
    } else {
        warn!("DETERMINISM FAILURE: Hashes differ!");
    }
}
