use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Subset of the `/metadata/{identifier}` response the pipeline reads.
///
/// An unknown identifier comes back as `{}`, which parses to an empty
/// listing rather than an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemMetadata {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub metadata: Option<ItemDescription>,
}

/// One file descriptor of an item. Only `name` is interpreted; the rest
/// (`format`, `size`, `md5`, ...) is kept for logging.
#[derive(Debug, Clone, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileEntry {
    pub fn size(&self) -> Option<u64> {
        match self.extra.get("size")? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemDescription {
    #[serde(default, deserialize_with = "first_text")]
    pub title: Option<String>,
}

/// Descriptive fields are a string for most items and a list of strings for
/// some; take the first non-empty value.
fn first_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        One(String),
        Many(Vec<String>),
        Other(serde::de::IgnoredAny),
    }

    let text = match Option::<Text>::deserialize(deserializer)? {
        Some(Text::One(s)) => Some(s),
        Some(Text::Many(v)) => v.into_iter().find(|s| !s.trim().is_empty()),
        Some(Text::Other(_)) | None => None,
    };
    Ok(text
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Listing snapshot for one catalog entry, taken once per run.
#[derive(Debug, Clone)]
pub struct CatalogListing {
    pub title: Option<String>,
    pub files: Vec<FileEntry>,
}

impl CatalogListing {
    pub fn from_metadata(metadata: ItemMetadata) -> Self {
        Self {
            title: metadata.metadata.and_then(|m| m.title),
            files: metadata.files,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_files_and_title() {
        let meta: ItemMetadata = serde_json::from_value(json!({
            "files": [
                {"name": "a.pdf", "format": "Text PDF", "size": "1234"},
                {"name": "a_meta.xml", "format": "Metadata"}
            ],
            "metadata": {"identifier": "item", "title": "Byte Magazine"}
        }))
        .unwrap();
        let listing = CatalogListing::from_metadata(meta);
        assert_eq!(listing.title.as_deref(), Some("Byte Magazine"));
        assert_eq!(listing.names().collect::<Vec<_>>(), ["a.pdf", "a_meta.xml"]);
        assert_eq!(listing.files[0].size(), Some(1234));
        assert_eq!(listing.files[1].size(), None);
    }

    #[test]
    fn test_title_list_takes_first_value() {
        let meta: ItemMetadata = serde_json::from_value(json!({
            "metadata": {"title": ["", "Second", "Third"]}
        }))
        .unwrap();
        assert_eq!(meta.metadata.unwrap().title.as_deref(), Some("Second"));
    }

    #[test]
    fn test_blank_or_odd_title_is_none() {
        let meta: ItemMetadata =
            serde_json::from_value(json!({"metadata": {"title": "   "}})).unwrap();
        assert_eq!(meta.metadata.unwrap().title, None);

        let meta: ItemMetadata =
            serde_json::from_value(json!({"metadata": {"title": 42}})).unwrap();
        assert_eq!(meta.metadata.unwrap().title, None);
    }

    #[test]
    fn test_unknown_item_is_empty_listing() {
        let meta: ItemMetadata = serde_json::from_str("{}").unwrap();
        let listing = CatalogListing::from_metadata(meta);
        assert!(listing.files.is_empty());
        assert!(listing.title.is_none());
    }
}
