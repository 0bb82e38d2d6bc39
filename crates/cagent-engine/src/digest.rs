use std::collections::HashMap;
use std::path::Path;

use cagent_tools::tree::list_tree;

/// Marker files used to guess the primary language/stack of a workspace.
const STACK_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("requirements.txt", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java/kotlin"),
];

const TEST_MARKERS: &[&str] = &["tests", "test", "spec", "__tests__"];
const IGNORED_TOP_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build", ".venv", ".tmp"];

/// A quick-scan summary of the workspace shown to the model as baseline
/// context: a shallow tree preview, language hints from marker files,
/// detected package-manager scripts, and whether a test suite exists.
pub fn compute_project_digest(workspace: &Path) -> String {
    let tree = list_tree(workspace, workspace, 2).unwrap_or_else(|_| "(unreadable)".to_string());
    let languages = detect_languages(workspace);
    let scripts = detect_scripts(workspace);
    let has_tests = detect_tests(workspace);

    let mut out = String::new();
    out.push_str("Language hints: ");
    out.push_str(&if languages.is_empty() {
        "none detected".to_string()
    } else {
        languages.join(", ")
    });
    out.push('\n');
    out.push_str(&format!("Test suite present: {has_tests}\n"));
    if !scripts.is_empty() {
        out.push_str(&format!("Detected scripts: {}\n", scripts.join(", ")));
    }
    out.push_str("Tree preview (depth 2):\n");
    out.push_str(&tree);
    out
}

/// A deeper pass over the workspace: full stack inference, the top-level
/// directories ranked by file count (a cheap proxy for "hotspots"), and a
/// few risk signals an agent should be cautious about before mutating.
pub fn compute_intelligence_snapshot(workspace: &Path) -> String {
    let languages = detect_languages(workspace);
    let top_dirs = top_level_directories_by_file_count(workspace);
    let risk_signals = detect_risk_signals(workspace, &top_dirs);

    let mut out = String::new();
    out.push_str(&format!(
        "Stack: {}\n",
        if languages.is_empty() { "unknown".into() } else { languages.join(", ") }
    ));
    out.push_str("Top directories (by file count): ");
    out.push_str(
        &top_dirs
            .iter()
            .take(5)
            .map(|(name, count)| format!("{name} ({count})"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    out.push('\n');
    if !risk_signals.is_empty() {
        out.push_str("Risk signals: ");
        out.push_str(&risk_signals.join("; "));
        out.push('\n');
    }
    out
}

fn detect_languages(workspace: &Path) -> Vec<String> {
    let mut found = Vec::new();
    for (marker, lang) in STACK_MARKERS {
        if workspace.join(marker).is_file() && !found.contains(&lang.to_string()) {
            found.push(lang.to_string());
        }
    }
    found
}

/// Pulls the `scripts` object's keys out of `package.json`, if present.
fn detect_scripts(workspace: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(workspace.join("package.json")) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        return Vec::new();
    };
    value["scripts"]
        .as_object()
        .map(|scripts| scripts.keys().cloned().collect())
        .unwrap_or_default()
}

fn detect_tests(workspace: &Path) -> bool {
    if TEST_MARKERS.iter().any(|m| workspace.join(m).is_dir()) {
        return true;
    }
    // Cargo and most toolchains colocate unit tests with source; a `tests/`
    // dir already covers integration tests, so this only flags the common
    // miss of a single top-level test file.
    std::fs::read_dir(workspace)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                let name = e.file_name().to_string_lossy().to_lowercase();
                name.contains("test") && e.path().is_file()
            })
        })
        .unwrap_or(false)
}

fn top_level_directories_by_file_count(workspace: &Path) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let Ok(entries) = std::fs::read_dir(workspace) else {
        return Vec::new();
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED_TOP_DIRS.contains(&name.as_str()) || !entry.path().is_dir() {
            continue;
        }
        let count = count_files(&entry.path(), 0);
        counts.insert(name, count);
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn count_files(dir: &Path, depth: u32) -> usize {
    if depth > 3 {
        return 0;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED_TOP_DIRS.contains(&name.as_str()) {
            continue;
        }
        if entry.path().is_dir() {
            total += count_files(&entry.path(), depth + 1);
        } else {
            total += 1;
        }
    }
    total
}

fn detect_risk_signals(workspace: &Path, top_dirs: &[(String, usize)]) -> Vec<String> {
    let mut signals = Vec::new();
    if !detect_tests(workspace) {
        signals.push("no test suite detected".to_string());
    }
    if !workspace.join(".github").join("workflows").is_dir() && !workspace.join(".gitlab-ci.yml").is_file() {
        signals.push("no CI configuration detected".to_string());
    }
    if top_dirs.iter().any(|(_, count)| *count > 400) {
        signals.push("at least one directory has an unusually large file count".to_string());
    }
    signals
}
