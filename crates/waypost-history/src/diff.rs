use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use waypost_core::{Document, Step, VersionSnapshot};

/// Human-readable delta between two snapshots.
///
/// This is a summary for review before a rollback decision, not a
/// byte-exact diff: it counts structural churn, not content edits inside a
/// matched step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub steps_changed: usize,
    pub blocks_changed: usize,
    pub images_changed: usize,
    pub title_changed: bool,
}

impl DiffSummary {
    /// Whether the summary records no change at all
    pub fn is_empty(&self) -> bool {
        self.steps_changed == 0
            && self.blocks_changed == 0
            && self.images_changed == 0
            && !self.title_changed
    }
}

/// A snapshot's delta against its predecessor in the history
#[derive(Debug, Clone, Serialize)]
pub struct VersionDelta {
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub summary: DiffSummary,
}

/// Compute the delta between two adjacent snapshots
pub fn diff(prev: &VersionSnapshot, curr: &VersionSnapshot) -> DiffSummary {
    diff_documents(&prev.document, &curr.document)
}

/// Compute the delta between two document states.
///
/// Counting rules:
/// - `steps_changed` is the size delta plus one per step id new in `curr`.
/// - `blocks_changed` accumulates block-count deltas within matched steps.
/// - `images_changed` accumulates image-URL-count deltas within matched
///   steps whose URL sets differ. Two sets of equal size with different
///   membership contribute 0; an in-place edit behind the same URL is
///   invisible here.
pub fn diff_documents(prev: &Document, curr: &Document) -> DiffSummary {
    let prev_steps: HashMap<&str, &Step> =
        prev.steps.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut steps_changed = prev.steps.len().abs_diff(curr.steps.len());
    let mut blocks_changed = 0;
    let mut images_changed = 0;

    for curr_step in &curr.steps {
        let Some(prev_step) = prev_steps.get(curr_step.id.as_str()) else {
            steps_changed += 1;
            continue;
        };

        blocks_changed += prev_step.blocks.len().abs_diff(curr_step.blocks.len());

        let prev_urls = prev_step.image_urls();
        let curr_urls = curr_step.image_urls();
        if prev_urls != curr_urls {
            images_changed += prev_urls.len().abs_diff(curr_urls.len());
        }
    }

    DiffSummary {
        steps_changed,
        blocks_changed,
        images_changed,
        title_changed: prev.title != curr.title,
    }
}

/// Deltas between every adjacent pair of a newest-first history.
///
/// Returns one entry per snapshot that has a predecessor, newest first.
pub fn adjacent_diffs(history: &[VersionSnapshot]) -> Vec<VersionDelta> {
    history
        .windows(2)
        .map(|pair| VersionDelta {
            version: pair[0].version,
            created_at: pair[0].created_at,
            summary: diff(&pair[1], &pair[0]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::{Block, Step};

    fn persisted_step(id: &str, title: &str) -> Step {
        let mut step = Step::new(title);
        step.mark_persisted(id);
        step
    }

    fn doc_with_steps(title: &str, steps: Vec<Step>) -> Document {
        let mut doc = Document::new(title);
        for step in steps {
            doc.push_step(step);
        }
        doc
    }

    #[test]
    fn test_title_change() {
        let prev = doc_with_steps("Before", vec![]);
        let curr = doc_with_steps("After", vec![]);

        let summary = diff_documents(&prev, &curr);
        assert!(summary.title_changed);
        assert_eq!(summary.steps_changed, 0);
    }

    #[test]
    fn test_step_churn_counts_new_steps_only_once() {
        // prev [s1, s2], curr [s2, s3]: same length, one new step
        let prev = doc_with_steps(
            "Doc",
            vec![persisted_step("s1", "One"), persisted_step("s2", "Two")],
        );
        let curr = doc_with_steps(
            "Doc",
            vec![persisted_step("s2", "Two"), persisted_step("s3", "Three")],
        );

        assert_eq!(diff_documents(&prev, &curr).steps_changed, 1);
        // Not commutative: reversed direction also sees exactly one new step
        assert_eq!(diff_documents(&curr, &prev).steps_changed, 1);
    }

    #[test]
    fn test_step_addition_counts_size_delta_and_new_ids() {
        let prev = doc_with_steps("Doc", vec![persisted_step("s1", "One")]);
        let curr = doc_with_steps(
            "Doc",
            vec![persisted_step("s1", "One"), persisted_step("s2", "Two")],
        );

        // size delta 1 + one new id
        assert_eq!(diff_documents(&prev, &curr).steps_changed, 2);
        // removal direction: size delta only
        assert_eq!(diff_documents(&curr, &prev).steps_changed, 1);
    }

    #[test]
    fn test_blocks_changed_within_matched_steps() {
        let mut before = persisted_step("s1", "One");
        before.blocks.push(Block::text("a"));

        let mut after = persisted_step("s1", "One");
        after.blocks.push(Block::text("a"));
        after.blocks.push(Block::text("b"));
        after.blocks.push(Block::text("c"));

        let prev = doc_with_steps("Doc", vec![before]);
        let curr = doc_with_steps("Doc", vec![after]);

        assert_eq!(diff_documents(&prev, &curr).blocks_changed, 2);
    }

    #[test]
    fn test_images_changed_uses_url_set_size_delta() {
        let mut before = persisted_step("s1", "One");
        before.blocks.push(Block::image("https://x/a.png"));
        before.blocks.push(Block::image("https://x/b.png"));

        let mut after = persisted_step("s1", "One");
        after.blocks.push(Block::image("https://x/a.png"));

        let prev = doc_with_steps("Doc", vec![before]);
        let curr = doc_with_steps("Doc", vec![after]);

        let summary = diff_documents(&prev, &curr);
        assert_eq!(summary.images_changed, 1);
        // The dropped block is counted via the URL set, not blocks_changed alone
        assert_eq!(summary.blocks_changed, 1);
    }

    #[test]
    fn test_same_size_url_swap_contributes_zero() {
        let mut before = persisted_step("s1", "One");
        before.blocks.push(Block::image("https://x/a.png"));

        let mut after = persisted_step("s1", "One");
        after.blocks.push(Block::image("https://x/b.png"));

        let prev = doc_with_steps("Doc", vec![before]);
        let curr = doc_with_steps("Doc", vec![after]);

        // Sets differ in membership but not size; the size-delta rule yields 0
        assert_eq!(diff_documents(&prev, &curr).images_changed, 0);
    }

    #[test]
    fn test_adjacent_diffs_newest_first() {
        let v1 = VersionSnapshot::new(1, doc_with_steps("Doc", vec![persisted_step("s1", "One")]));
        let v2 = VersionSnapshot::new(
            2,
            doc_with_steps(
                "Doc",
                vec![persisted_step("s1", "One"), persisted_step("s2", "Two")],
            ),
        );
        let v3 = VersionSnapshot::new(
            3,
            doc_with_steps(
                "Renamed",
                vec![persisted_step("s1", "One"), persisted_step("s2", "Two")],
            ),
        );

        let history = vec![v3, v2, v1];
        let deltas = adjacent_diffs(&history);

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].version, 3);
        assert!(deltas[0].summary.title_changed);
        assert_eq!(deltas[1].version, 2);
        assert_eq!(deltas[1].summary.steps_changed, 2);
    }
}
