use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Deserialize an explicit JSON `null` as the type's default value.
///
/// Cache entries and older backend payloads sometimes carry `"data": null`
/// where a map is expected; treating that as missing keeps malformed blocks
/// structurally complete instead of failing the whole document.
pub(crate) fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Kind of content a block carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Image,
    Video,
    Embed,
    /// Any block type this client does not model; preserved, never dropped
    #[serde(other)]
    Other,
}

impl Default for BlockKind {
    fn default() -> Self {
        BlockKind::Text
    }
}

/// A single content block inside a step.
///
/// A block always has a non-empty `id`, a `kind`, and `data`/`settings`
/// maps. Payloads that violate this are normalized to empty defaults so a
/// half-written block never propagates nulls into the reorder or
/// persistence paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "null_to_default")]
    pub kind: BlockKind,
    #[serde(default, deserialize_with = "null_to_default")]
    pub data: Map<String, Value>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub settings: Map<String, Value>,
}

impl Block {
    /// Create an empty block of the given kind with a fresh id
    pub fn new(kind: BlockKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            data: Map::new(),
            settings: Map::new(),
        }
    }

    /// Create a text block with the given body
    pub fn text(body: impl Into<String>) -> Self {
        let mut block = Self::new(BlockKind::Text);
        block.data.insert("text".into(), Value::String(body.into()));
        block
    }

    /// Create an image block referencing the given URL
    pub fn image(url: impl Into<String>) -> Self {
        let mut block = Self::new(BlockKind::Image);
        block.data.insert("url".into(), Value::String(url.into()));
        block
    }

    /// Fill in anything a well-formed block must have.
    ///
    /// Idempotent: a block that is already well-formed is left untouched.
    pub fn normalize(&mut self) {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
    }

    /// The image URL carried by this block, if it is an image block with a
    /// non-empty `data.url`
    pub fn image_url(&self) -> Option<&str> {
        if self.kind != BlockKind::Image {
            return None;
        }
        self.data
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }

    /// An image block whose URL was lost; it cannot be repaired by replaying
    /// history
    pub fn is_empty_image(&self) -> bool {
        self.kind == BlockKind::Image && self.image_url().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_fields_normalize_to_defaults() {
        let json = r#"{"id": "b1", "type": null, "data": null, "settings": null}"#;
        let block: Block = serde_json::from_str(json).unwrap();

        assert_eq!(block.kind, BlockKind::Text);
        assert!(block.data.is_empty());
        assert!(block.settings.is_empty());
    }

    #[test]
    fn test_missing_fields_normalize_to_defaults() {
        let block: Block = serde_json::from_str(r#"{"id": "b1"}"#).unwrap();

        assert_eq!(block.kind, BlockKind::Text);
        assert!(block.data.is_empty());
        assert!(block.settings.is_empty());
    }

    #[test]
    fn test_unknown_kind_is_preserved_as_other() {
        let block: Block = serde_json::from_str(r#"{"id": "b1", "type": "callout"}"#).unwrap();
        assert_eq!(block.kind, BlockKind::Other);
    }

    #[test]
    fn test_normalize_assigns_missing_id() {
        let mut block: Block = serde_json::from_str(r#"{"type": "text"}"#).unwrap();
        assert!(block.id.is_empty());

        block.normalize();
        assert!(!block.id.is_empty());

        // Idempotent on a well-formed block
        let id = block.id.clone();
        block.normalize();
        assert_eq!(block.id, id);
    }

    #[test]
    fn test_image_url() {
        let block = Block::image("https://cdn.example.com/a.png");
        assert_eq!(block.image_url(), Some("https://cdn.example.com/a.png"));

        let mut empty = Block::new(BlockKind::Image);
        assert_eq!(empty.image_url(), None);
        assert!(empty.is_empty_image());

        empty.data.insert("url".into(), Value::String(String::new()));
        assert_eq!(empty.image_url(), None);

        let text = Block::text("hello");
        assert_eq!(text.image_url(), None);
        assert!(!text.is_empty_image());
    }
}
