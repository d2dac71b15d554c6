use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::{null_to_default, Block};
use crate::error::DocumentError;

/// Prefix of locally-generated step ids that have not been persisted yet
pub const TEMP_STEP_PREFIX: &str = "temp-";

/// Generate a fresh temporary step id
pub fn temp_step_id() -> String {
    format!("{}{}", TEMP_STEP_PREFIX, Uuid::new_v4())
}

/// Lifecycle status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Published,
}

impl Default for DocumentStatus {
    fn default() -> Self {
        DocumentStatus::Draft
    }
}

/// One step of a walkthrough.
///
/// `id` starts as a locally-generated temporary token and is replaced by
/// the server-assigned id on the first successful create; `is_persisted`
/// flips irreversibly at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub is_persisted: bool,
    #[serde(default)]
    pub order: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub blocks: Vec<Block>,
}

impl Step {
    /// Create a new local step with a temporary id
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: temp_step_id(),
            is_persisted: false,
            order: 0,
            title: title.into(),
            content: String::new(),
            blocks: Vec::new(),
        }
    }

    /// Whether this step carries a server-assigned identity.
    ///
    /// The reorder endpoint must never see an id for which this is false.
    pub fn has_durable_id(&self) -> bool {
        self.is_persisted && !self.id.is_empty() && !self.id.starts_with(TEMP_STEP_PREFIX)
    }

    /// Replace the temporary id with the server-assigned one.
    ///
    /// There is no transition back: once persisted, later syncs only update.
    pub fn mark_persisted(&mut self, durable_id: impl Into<String>) {
        self.id = durable_id.into();
        self.is_persisted = true;
    }

    /// Normalize every block (see [`Block::normalize`])
    pub fn normalize(&mut self) {
        for block in &mut self.blocks {
            block.normalize();
        }
    }

    /// URLs of all image blocks in this step with a non-empty `data.url`
    pub fn image_urls(&self) -> BTreeSet<String> {
        self.blocks
            .iter()
            .filter_map(|b| b.image_url())
            .map(str::to_owned)
            .collect()
    }
}

/// A walkthrough document: an ordered list of steps plus metadata.
///
/// `id` is `None` until the backend confirms creation. Mutations must only
/// happen while the caller holds the workspace's edit lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default, deserialize_with = "null_to_default")]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub version: i64,
    /// Portal access secret; stripped from draft-cache writes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_password: Option<String>,
}

impl Document {
    /// Create a new unpersisted document
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            status: DocumentStatus::Draft,
            steps: Vec::new(),
            version: 0,
            access_password: None,
        }
    }

    /// Whether the backend has assigned this document an identity
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Whether every step carries a server-assigned id
    pub fn all_steps_durable(&self) -> bool {
        self.steps.iter().all(Step::has_durable_id)
    }

    /// Append a step and renumber
    pub fn push_step(&mut self, step: Step) {
        self.steps.push(step);
        self.renumber_steps();
    }

    /// Insert a step at the given position and renumber
    pub fn insert_step(&mut self, index: usize, step: Step) -> Result<(), DocumentError> {
        if index > self.steps.len() {
            return Err(DocumentError::StepIndexOutOfBounds(index));
        }
        self.steps.insert(index, step);
        self.renumber_steps();
        Ok(())
    }

    /// Remove a step by id and renumber
    pub fn remove_step(&mut self, id: &str) -> Result<Step, DocumentError> {
        let index = self
            .steps
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| DocumentError::StepNotFound(id.to_string()))?;
        let step = self.steps.remove(index);
        self.renumber_steps();
        Ok(step)
    }

    /// Move a step from one position to another and renumber
    pub fn move_step(&mut self, from: usize, to: usize) -> Result<(), DocumentError> {
        if from >= self.steps.len() {
            return Err(DocumentError::StepIndexOutOfBounds(from));
        }
        if to >= self.steps.len() {
            return Err(DocumentError::StepIndexOutOfBounds(to));
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        self.renumber_steps();
        Ok(())
    }

    /// Reassign zero-based contiguous `order` values in list order
    pub fn renumber_steps(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.order = i as i64;
        }
    }

    /// Get a step by id
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a mutable step by id
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Normalize every step's blocks (see [`Block::normalize`])
    pub fn normalize(&mut self) {
        for step in &mut self.steps {
            step.normalize();
        }
    }

    /// URLs of all image blocks across all steps with a non-empty `data.url`
    pub fn image_urls(&self) -> BTreeSet<String> {
        self.steps
            .iter()
            .flat_map(|s| s.image_urls())
            .collect()
    }
}
