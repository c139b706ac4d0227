//! Domain records and their sync representations.

use std::fmt;

use chrono::{DateTime, Utc};
use keepsake_crypto::FieldMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::{BOOKMARKS_TABLE, CATEGORIES_TABLE};
use crate::error::{Error, Result};

// =============================================================================
// RECORD KIND
// =============================================================================

/// The two mirrored record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Category,
    Bookmark,
}

impl RecordKind {
    /// Order of a full-sync pass: categories first, since bookmarks refer to them.
    pub const SYNC_ORDER: [RecordKind; 2] = [RecordKind::Category, RecordKind::Bookmark];

    /// Remote table for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Category => CATEGORIES_TABLE,
            RecordKind::Bookmark => BOOKMARKS_TABLE,
        }
    }

    /// Fields encrypted before leaving the device.
    pub fn sensitive_fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Category => &["name"],
            RecordKind::Bookmark => &["title", "url", "note", "author", "tags"],
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Category => write!(f, "category"),
            RecordKind::Bookmark => write!(f, "bookmark"),
        }
    }
}

// =============================================================================
// BOOKMARK
// =============================================================================

/// Where a bookmark was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    #[default]
    Web,
    Twitter,
    Instagram,
    Youtube,
    Tiktok,
    Reddit,
    Other,
}

/// A saved piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Assigned on-device at creation; never changes.
    pub client_id: Uuid,
    pub title: String,
    pub url: String,
    pub note: Option<String>,
    pub author: Option<String>,
    pub source: ContentSource,
    pub tags: Vec<String>,
    /// Storage references of uploaded images, not the images themselves.
    pub image_paths: Vec<String>,
    pub category_id: Option<Uuid>,
    pub is_favorite: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            client_id: Uuid::now_v7(),
            title: title.into(),
            url: url.into(),
            note: None,
            author: None,
            source: ContentSource::default(),
            tags: Vec::new(),
            image_paths: Vec::new(),
            category_id: None,
            is_favorite: false,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_source(mut self, source: ContentSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    /// Mark the record as locally modified.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// CATEGORY
// =============================================================================

/// A user-defined folder for bookmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Assigned on-device at creation; never changes.
    pub client_id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            client_id: Uuid::now_v7(),
            name: name.into(),
            icon: None,
            color: None,
            order_index: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_order_index(mut self, order_index: i32) -> Self {
        self.order_index = order_index;
        self
    }

    /// Mark the record as locally modified.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// SYNC REPRESENTATIONS
// =============================================================================

/// A record that can be mirrored remotely.
pub trait SyncableRecord: Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    fn client_id(&self) -> Uuid;

    /// Immutable value copy for handing to background work.
    fn snapshot(&self) -> RecordSnapshot;

    /// Identifying fields only, for deletions.
    fn record_ref(&self) -> RecordRef {
        RecordRef {
            kind: Self::KIND,
            client_id: self.client_id(),
        }
    }
}

impl SyncableRecord for Bookmark {
    const KIND: RecordKind = RecordKind::Bookmark;

    fn client_id(&self) -> Uuid {
        self.client_id
    }

    fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::Bookmark(self.clone())
    }
}

impl SyncableRecord for Category {
    const KIND: RecordKind = RecordKind::Category;

    fn client_id(&self) -> Uuid {
        self.client_id
    }

    fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot::Category(self.clone())
    }
}

/// Owned copy of a record's field values at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSnapshot {
    Bookmark(Bookmark),
    Category(Category),
}

impl RecordSnapshot {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordSnapshot::Bookmark(_) => RecordKind::Bookmark,
            RecordSnapshot::Category(_) => RecordKind::Category,
        }
    }

    pub fn client_id(&self) -> Uuid {
        match self {
            RecordSnapshot::Bookmark(b) => b.client_id,
            RecordSnapshot::Category(c) => c.client_id,
        }
    }

    pub fn record_ref(&self) -> RecordRef {
        RecordRef {
            kind: self.kind(),
            client_id: self.client_id(),
        }
    }

    /// All field values as a JSON object, keyed by wire name.
    pub fn to_fields(&self) -> Result<FieldMap> {
        let value = match self {
            RecordSnapshot::Bookmark(b) => serde_json::to_value(b)?,
            RecordSnapshot::Category(c) => serde_json::to_value(c)?,
        };
        match value {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::Serialization(format!(
                "record serialized to {} instead of an object",
                other
            ))),
        }
    }
}

/// Identifying fields of a record, captured before a local delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub client_id: Uuid,
}

/// A row in the remote mirror.
///
/// `fields` holds every record field except the identifiers; sensitive ones
/// are ciphertext when `is_encrypted` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    /// Server-assigned, opaque. Absent on rows not yet inserted. Text, uuid
    /// and integer `id` columns are all read as text.
    #[serde(
        rename = "id",
        default,
        deserialize_with = "remote_id_text_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_id: Option<String>,
    pub owner_id: String,
    pub client_id: Uuid,
    pub is_encrypted: bool,
    pub sync_version: i64,
    #[serde(flatten)]
    pub fields: FieldMap,
}

fn remote_id_text_or_number<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|id| match id {
        RawId::Text(text) => text,
        RawId::Signed(n) => n.to_string(),
        RawId::Unsigned(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sync_order_puts_categories_first() {
        assert_eq!(RecordKind::SYNC_ORDER[0], RecordKind::Category);
        assert_eq!(RecordKind::SYNC_ORDER[1], RecordKind::Bookmark);
    }

    #[test]
    fn test_kind_tables() {
        assert_eq!(RecordKind::Bookmark.table(), "bookmarks");
        assert_eq!(RecordKind::Category.table(), "categories");
        assert_eq!(RecordKind::Bookmark.to_string(), "bookmark");
    }

    #[test]
    fn test_new_records_get_distinct_client_ids() {
        let a = Bookmark::new("A", "https://a.example");
        let b = Bookmark::new("A", "https://a.example");
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn test_touch_keeps_client_id() {
        let mut bookmark = Bookmark::new("A", "https://a.example");
        let id = bookmark.client_id;
        let before = bookmark.updated_at;
        bookmark.touch();
        assert_eq!(bookmark.client_id, id);
        assert!(bookmark.updated_at >= before);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut bookmark = Bookmark::new("Original", "https://a.example");
        let snapshot = bookmark.snapshot();
        bookmark.title = "Changed".into();

        match snapshot {
            RecordSnapshot::Bookmark(b) => assert_eq!(b.title, "Original"),
            _ => panic!("expected bookmark snapshot"),
        }
    }

    #[test]
    fn test_snapshot_fields_use_wire_names() {
        let category = Category::new("Recipes").with_order_index(2);
        let fields = category.snapshot().to_fields().unwrap();

        assert_eq!(fields["name"], json!("Recipes"));
        assert_eq!(fields["order_index"], json!(2));
        assert!(fields.contains_key("created_at"));
    }

    #[test]
    fn test_sensitive_fields_exist_on_records() {
        let bookmark = Bookmark::new("t", "u").with_note("n").with_author("a");
        let fields = bookmark.snapshot().to_fields().unwrap();
        for name in RecordKind::Bookmark.sensitive_fields() {
            assert!(fields.contains_key(*name), "missing {}", name);
        }
    }

    #[test]
    fn test_remote_row_wire_shape() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!("ciphertext"));
        let row = RemoteRow {
            remote_id: None,
            owner_id: "user-1".into(),
            client_id: Uuid::nil(),
            is_encrypted: true,
            sync_version: 1,
            fields,
        };

        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["owner_id"], json!("user-1"));
        assert_eq!(value["is_encrypted"], json!(true));
        assert_eq!(value["name"], json!("ciphertext"));

        let mut with_id = value.clone();
        with_id["id"] = json!("row-9");
        let parsed: RemoteRow = serde_json::from_value(with_id).unwrap();
        assert_eq!(parsed.remote_id.as_deref(), Some("row-9"));
        assert_eq!(parsed.fields["name"], json!("ciphertext"));
    }

    #[test]
    fn test_remote_row_accepts_integer_and_null_ids() {
        let row = json!({
            "owner_id": "user-1",
            "client_id": Uuid::nil(),
            "is_encrypted": false,
            "sync_version": 3,
            "name": "Reading",
        });

        let mut bigint = row.clone();
        bigint["id"] = json!(9_007_199_254_740_993_i64);
        let parsed: RemoteRow = serde_json::from_value(bigint).unwrap();
        assert_eq!(parsed.remote_id.as_deref(), Some("9007199254740993"));
        assert!(!parsed.fields.contains_key("id"));

        let mut null_id = row.clone();
        null_id["id"] = json!(null);
        let parsed: RemoteRow = serde_json::from_value(null_id).unwrap();
        assert!(parsed.remote_id.is_none());

        let parsed: RemoteRow = serde_json::from_value(row).unwrap();
        assert!(parsed.remote_id.is_none());
        assert_eq!(parsed.fields["name"], json!("Reading"));
    }
}
