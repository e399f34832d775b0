//! The `proctor replay` command.
//!
//! Feeds an exported queue snapshot — the manual-submission fallback a
//! stranded client produces — through the authoritative controller, exactly
//! as a sync flush would have.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::Table;

use proctor_client::queue::QueueSnapshot;
use proctor_core::ledger::ClockTarget;
use proctor_core::map::TestMap;
use proctor_core::session::SessionContext;
use proctor_core::store::MemoryStore;
use proctor_core::tags::TagSet;
use proctor_server::{NoopSink, SyncActionController};

pub async fn execute(map_path: PathBuf, snapshot_path: PathBuf, durations: bool) -> Result<()> {
    let map = TestMap::load(&map_path)?;
    let snapshot = load_snapshot(&snapshot_path)?;
    tracing::debug!(
        actions = snapshot.entries.len(),
        session = %snapshot.session_id,
        "starting replay"
    );

    println!(
        "Replaying {} action(s) for session '{}' (user '{}')",
        snapshot.entries.len(),
        snapshot.session_id,
        snapshot.user_id
    );

    let store = Arc::new(MemoryStore::new());
    let controller = SyncActionController::new(map, store, Arc::new(NoopSink));
    let mut ctx = SessionContext::new(snapshot.user_id.clone(), snapshot.session_id.clone());

    let begin_at = snapshot
        .entries
        .first()
        .map(|e| e.created_at)
        .unwrap_or(snapshot.exported_at);
    let begun = controller.begin(&mut ctx, begin_at).await;
    if !begun.success {
        anyhow::bail!(
            "could not begin session: {}",
            begun.error.unwrap_or_default()
        );
    }

    let outcomes = controller.dispatch_batch(&mut ctx, &snapshot.entries).await;

    let mut failed = 0usize;
    for (entry, outcome) in snapshot.entries.iter().zip(&outcomes) {
        if outcome.success {
            println!("  ok   {} ({})", entry.action.name(), entry.client_id);
        } else {
            failed += 1;
            println!(
                "  FAIL {} ({}): {}",
                entry.action.name(),
                entry.client_id,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!(
        "\n{} applied, {} failed. Session is {}.",
        outcomes.len() - failed,
        failed,
        ctx.state
    );

    if durations {
        print_durations(controller.map(), &ctx, snapshot.exported_at);
    }

    if failed > 0 {
        anyhow::bail!("{failed} action(s) failed to replay");
    }
    Ok(())
}

fn load_snapshot(path: &PathBuf) -> Result<QueueSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse snapshot: {}", path.display()))
}

fn print_durations(map: &TestMap, ctx: &SessionContext, now: chrono::DateTime<chrono::Utc>) {
    let mut table = Table::new();
    table.set_header(vec!["Scope", "Identifier", "Duration"]);

    let mut seen = std::collections::HashSet::new();
    let mut add_row = |scope: &str, tag: proctor_core::tags::Tag| {
        if seen.insert(tag.clone()) {
            let ms = ctx
                .ledger
                .compute(&TagSet::single(tag.clone()), ClockTarget::Server, now);
            table.add_row(vec![scope.to_string(), tag.to_string(), format_ms(ms)]);
        }
    };

    add_row("test", map.id.clone());
    for entry in map.entries() {
        add_row("part", entry.part.clone());
        add_row("section", entry.section.clone());
        add_row("item", entry.item.clone());
    }

    println!("{table}");
}

fn format_ms(ms: u64) -> String {
    format!("{}.{:03}s", ms / 1000, ms % 1000)
}
