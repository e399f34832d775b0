//! The `proctor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use proctor_core::map::TestMap;

pub fn execute(map_path: PathBuf) -> Result<()> {
    let map = TestMap::load(&map_path)?;

    println!(
        "Test map: {} ({} parts, {} items)",
        map.id,
        map.parts.len(),
        map.item_count()
    );

    let warnings = map.validate();
    for w in &warnings {
        let prefix = w
            .source
            .as_ref()
            .map(|s| format!("  [{s}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Test map is valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
