use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use waypost_core::{Document, VersionSnapshot};

/// Diagnosis of image blocks across the current document and its history
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub current_version: i64,
    pub has_image_blocks: bool,
    /// Image blocks in the current document with a non-empty URL
    pub total_image_blocks: usize,
    /// Per step id, how many image blocks carry a non-empty URL
    pub per_step_image_counts: BTreeMap<String, usize>,
    /// One entry per historical snapshot, newest first
    pub version_details: Vec<VersionDetail>,
    pub can_recover: bool,
}

/// Image-block census of one historical snapshot
#[derive(Debug, Clone, Serialize)]
pub struct VersionDetail {
    pub version: i64,
    pub per_step_image_counts: BTreeMap<String, usize>,
    /// Image blocks whose URL was lost; these cannot be restored by replay
    pub empty_block_count: usize,
}

/// The outcome of merging a snapshot's image blocks back into a document
#[derive(Debug, Clone)]
pub struct Recovery {
    pub document: Document,
    pub recovered_count: usize,
    /// The snapshot version the blocks were taken from
    pub source_version: i64,
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No snapshot holds an image URL absent from the current document.
    /// Informational for the caller, not a crash.
    #[error("no historical snapshot has recoverable image blocks")]
    NothingToRecover,

    #[error("version {0} not found in history")]
    VersionNotFound(i64),
}

fn per_step_image_counts(document: &Document) -> BTreeMap<String, usize> {
    document
        .steps
        .iter()
        .map(|step| {
            let count = step.blocks.iter().filter(|b| b.image_url().is_some()).count();
            (step.id.clone(), count)
        })
        .collect()
}

fn empty_image_count(document: &Document) -> usize {
    document
        .steps
        .iter()
        .flat_map(|s| s.blocks.iter())
        .filter(|b| b.is_empty_image())
        .count()
}

/// Whether the snapshot holds at least one image URL the document lacks
fn has_recoverable_urls(snapshot: &VersionSnapshot, document: &Document) -> bool {
    let current = document.image_urls();
    snapshot
        .document
        .image_urls()
        .iter()
        .any(|url| !current.contains(url))
}

/// Scan the current document and its history for silently-dropped image
/// blocks. Always produces a report, even when nothing is recoverable.
pub fn diagnose(document: &Document, history: &[VersionSnapshot]) -> RecoveryReport {
    let per_step = per_step_image_counts(document);
    let total: usize = per_step.values().sum();

    let version_details = history
        .iter()
        .map(|snapshot| VersionDetail {
            version: snapshot.version,
            per_step_image_counts: per_step_image_counts(&snapshot.document),
            empty_block_count: empty_image_count(&snapshot.document),
        })
        .collect();

    let can_recover = history.iter().any(|s| has_recoverable_urls(s, document));

    RecoveryReport {
        current_version: document.version,
        has_image_blocks: total > 0,
        total_image_blocks: total,
        per_step_image_counts: per_step,
        version_details,
        can_recover,
    }
}

/// Merge URL-bearing image blocks from a historical snapshot back into the
/// document.
///
/// `history` is newest first. With no explicit `version`, the newest
/// snapshot that still holds a missing URL is used. Blocks are merged into
/// the step with the matching id; blocks with empty URLs are never
/// proposed. The input document is not mutated.
pub fn recover(
    document: &Document,
    history: &[VersionSnapshot],
    version: Option<i64>,
) -> Result<Recovery, RecoveryError> {
    let snapshot = match version {
        Some(v) => history
            .iter()
            .find(|s| s.version == v)
            .ok_or(RecoveryError::VersionNotFound(v))?,
        None => history
            .iter()
            .find(|s| has_recoverable_urls(s, document))
            .ok_or(RecoveryError::NothingToRecover)?,
    };

    let mut merged = document.clone();
    let mut known_urls = merged.image_urls();
    let mut recovered_count = 0;

    for old_step in &snapshot.document.steps {
        let Some(step) = merged.step_mut(&old_step.id) else {
            continue;
        };
        for block in &old_step.blocks {
            let Some(url) = block.image_url() else {
                continue;
            };
            if known_urls.contains(url) {
                continue;
            }
            known_urls.insert(url.to_owned());
            let mut restored = block.clone();
            restored.normalize();
            step.blocks.push(restored);
            recovered_count += 1;
        }
    }

    if recovered_count == 0 {
        return Err(RecoveryError::NothingToRecover);
    }

    Ok(Recovery {
        document: merged,
        recovered_count,
        source_version: snapshot.version,
    })
}
