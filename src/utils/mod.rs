// Utility functions

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// Artifact Paths
// =============================================================================

/// Path of the evaluation sheet written for a session.
#[inline]
pub fn evaluation_template_path(artifacts_dir: &Path, session_id: &str) -> PathBuf {
    artifacts_dir.join(format!("{}_evaluation_template.yaml", session_id))
}

/// Path of the action-plan document written for a session.
#[inline]
pub fn action_plan_path(artifacts_dir: &Path, session_id: &str, top_k: usize) -> PathBuf {
    artifacts_dir.join(format!("{}_top{}_action_plans.md", session_id, top_k))
}

/// Ensure a directory exists, creating parents as needed.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Write a file atomically: write to a sibling temp file, fsync, then rename.
///
/// Readers either see the previous content or the complete new content.
pub fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)
}

// =============================================================================
// Text Helpers
// =============================================================================

/// Truncate text for log output without splitting a UTF-8 character.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}… ({} chars total)", truncated, text.chars().count())
}

/// Canonical form of a question used to compare question sets across rounds.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['?', '.', '!'])
        .to_lowercase()
}

/// Lowercased alphanumeric tokens of a text.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

// =============================================================================
// Locking
// =============================================================================

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// The data is plain collections, so a panic mid-update cannot leave it unusable.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}
