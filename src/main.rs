//! Pong Tournament Server
//!
//! Runs a four-player bracket end to end on in-memory collaborators.
//! Results are posted to the statistics service when `USER_URL` is set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pong_tournament::{
    config::AppConfig,
    game::RallyRunnerFactory,
    memory::{MemoryGateway, MemoryStatsReporter, MemoryStore},
    network::ConnectionId,
    session::{Collaborators, Competitor, MatchRegistry},
    store::{HttpStatsReporter, MatchId, MatchRecord, RoomId, RoomRecord, StatsReporter, UserId},
    VERSION,
};

const FINAL: MatchId = MatchId(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    info!("Pong Tournament Server v{}", VERSION);
    info!("Grace period: {:?}", config.session.grace_period);
    info!("Winning score: {}", config.rally.winning_score);

    let stats: Arc<dyn StatsReporter> = match &config.stats {
        Some(stats) => {
            info!("Reporting results to {}", stats.endpoint());
            Arc::new(HttpStatsReporter::new(stats).context("building statistics client")?)
        }
        None => {
            warn!("USER_URL not set, results are kept in memory");
            Arc::new(MemoryStatsReporter::new())
        }
    };

    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MemoryGateway::new());
    seed_bracket(&store);

    let registry = MatchRegistry::new(
        config.session.clone(),
        Collaborators {
            gateway: gateway.clone(),
            store: store.clone(),
            stats,
            runners: Arc::new(RallyRunnerFactory::new(config.rally.clone())),
        },
    );

    demo_bracket(&registry, &store).await?;

    info!("=== Bracket Results ===");
    for (match_id, report) in store.results() {
        info!(
            "Match {}: {} {} - {} {}, winner {}",
            match_id,
            report.player1_id,
            report.player1_score,
            report.player2_score,
            report.player2_id,
            report.winner_id
        );
    }
    info!("Connections closed: {}", gateway.disconnected().len());

    Ok(())
}

/// Two semifinals feeding one final, all in room "demo-cup".
fn seed_bracket(store: &MemoryStore) {
    let room = RoomRecord {
        id: RoomId(1),
        name: "demo-cup".to_string(),
    };

    for (id, next) in [(1, Some(FINAL)), (2, Some(FINAL)), (FINAL.0, None)] {
        store.insert_match(MatchRecord {
            id: MatchId(id),
            room: room.clone(),
            winner_match: next,
            start_at: Some(chrono::Utc::now()),
        });
    }
    for user in 1..=4 {
        store.add_member(UserId(user), room.id);
    }
}

async fn demo_bracket(registry: &Arc<MatchRegistry>, store: &MemoryStore) -> anyhow::Result<()> {
    info!("=== Semifinals ===");

    let players: Vec<(MatchId, Competitor)> = (1..=4)
        .map(|user| {
            let match_id = MatchId(if user <= 2 { 1 } else { 2 });
            (match_id, Competitor::human(UserId(user), ConnectionId::generate()))
        })
        .collect();

    for (match_id, competitor) in &players {
        let seat = registry.decide_seat(*match_id, competitor.clone()).await?;
        info!("User {} decided into match {} {}", competitor.id(), match_id, seat);
    }
    for (match_id, competitor) in &players {
        let session = registry.get_or_create(*match_id).await?;
        let outcome = session.connect(competitor.clone()).await?;
        info!("User {} connected to match {}: {:?}", competitor.id(), match_id, outcome);
    }

    wait_for_results(store, 2).await?;

    info!("=== Final ===");

    let session = registry.get_or_create(FINAL).await?;
    let finalists: Vec<_> = session
        .snapshot()
        .await
        .seats
        .into_iter()
        .flatten()
        .map(|seat| seat.user_id)
        .collect();
    if finalists.len() != 2 {
        bail!("final has {} seated finalists", finalists.len());
    }

    for user in finalists {
        let outcome = session.connect(Competitor::human(user, ConnectionId::generate())).await?;
        info!("Finalist {} connected: {:?}", user, outcome);
    }

    wait_for_results(store, 3).await
}

async fn wait_for_results(store: &MemoryStore, count: usize) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(120);

    while store.results().len() < count {
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for {} results", count);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}
