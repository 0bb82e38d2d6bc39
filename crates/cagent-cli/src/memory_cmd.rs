use std::path::PathBuf;

use anyhow::{Context, Result};
use cagent_memory::{export_json, import_json, MemoryStore};

fn store_path(workspace: &str) -> Result<PathBuf> {
    let workspace = PathBuf::from(workspace)
        .canonicalize()
        .with_context(|| format!("workspace '{workspace}' does not exist"))?;
    Ok(workspace.join(".tmp").join("agent-memory").join("store.json"))
}

pub fn handle_list(workspace: String, query: String, limit: usize) -> Result<()> {
    let workspace_canon = PathBuf::from(&workspace)
        .canonicalize()
        .with_context(|| format!("workspace '{workspace}' does not exist"))?
        .display()
        .to_string();
    let store = MemoryStore::load(store_path(&workspace)?)?;
    let hits = store.retrieve(&workspace_canon, &query, limit);
    if hits.is_empty() {
        println!("(no matching memory entries)");
        return Ok(());
    }
    for entry in hits {
        println!(
            "{:<20} {:<40} pinned={} confidence={:.2}",
            format!("{:?}", entry.kind),
            entry.title,
            entry.pinned,
            entry.confidence_score
        );
    }
    Ok(())
}

pub fn handle_export(workspace: String, out: Option<String>) -> Result<()> {
    let store = MemoryStore::load(store_path(&workspace)?)?;
    let json = export_json(&store)?;
    match out {
        Some(path) => std::fs::write(&path, json).with_context(|| format!("failed to write {path}"))?,
        None => println!("{json}"),
    }
    Ok(())
}

pub fn handle_import(workspace: String, file: String) -> Result<()> {
    let mut store = MemoryStore::load(store_path(&workspace)?)?;
    let json = std::fs::read_to_string(&file).with_context(|| format!("failed to read {file}"))?;
    let count = import_json(&mut store, &json)?;
    store.save()?;
    println!("imported {count} entr{}", if count == 1 { "y" } else { "ies" });
    Ok(())
}
