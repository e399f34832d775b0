//! The `proctor inspect` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::Table;

use proctor_client::queue::QueueSnapshot;

pub fn execute(snapshot_path: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&snapshot_path)
        .with_context(|| format!("failed to read snapshot: {}", snapshot_path.display()))?;
    let snapshot: QueueSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse snapshot: {}", snapshot_path.display()))?;

    println!(
        "Snapshot for session '{}' (user '{}'), exported {}",
        snapshot.session_id, snapshot.user_id, snapshot.exported_at
    );

    let mut table = Table::new();
    table.set_header(vec!["#", "Action", "Client ID", "Queued at", "Offline"]);
    for (index, entry) in snapshot.entries.iter().enumerate() {
        table.add_row(vec![
            index.to_string(),
            entry.action.name().to_string(),
            entry.client_id.to_string(),
            entry.created_at.to_rfc3339(),
            entry.offline.to_string(),
        ]);
    }
    println!("{table}");
    println!("{} pending action(s).", snapshot.entries.len());

    Ok(())
}
