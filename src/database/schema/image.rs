use arrayvec::ArrayString;
use chrono::{DateTime, TimeZone, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::common::errors::ServiceError;

// Key: ImageId -> Value: ImageRecord (bitcode)
pub const IMAGE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("image");

// Key: storage path -> Value: ImageId
pub const IMAGE_PATH_TABLE: TableDefinition<&str, &str> = TableDefinition::new("image_path");

/// Hyphenated lowercase UUID v4.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
#[serde(transparent)]
pub struct ImageId(ArrayString<36>);

impl ImageId {
    pub fn new() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Accepts any UUID spelling and normalizes it; anything else is not an id.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self::from_uuid)
    }

    fn from_uuid(uuid: Uuid) -> Self {
        let mut buffer = Uuid::encode_buffer();
        let hyphenated = uuid.hyphenated().encode_lower(&mut buffer);
        Self(ArrayString::from(hyphenated).expect("hyphenated UUID is 36 bytes"))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum ImageFilter {
    #[default]
    Invert,
    /// Edge detection
    Canny,
}

impl ImageFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFilter::Invert => "invert",
            ImageFilter::Canny => "canny",
        }
    }
}

impl fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFilter {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "invert" => Ok(ImageFilter::Invert),
            "canny" | "edge-detect" | "edge_detect" => Ok(ImageFilter::Canny),
            other => Err(ServiceError::UnknownFilter(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: ImageId,
    pub path: String,
    pub size: u64,
    pub mime_type: String,
    pub filter: ImageFilter,
    /// Unix milliseconds
    pub modified_at: i64,
}

impl ImageRecord {
    pub fn filename(&self) -> &str {
        self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path)
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.modified_at)
            .single()
            .unwrap_or_default()
    }
}

/// Fields rewritten when an existing path is uploaded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageUpdate {
    pub size: u64,
    pub filter: ImageFilter,
    pub modified_at: i64,
}

impl ImageUpdate {
    pub fn apply(self, record: &mut ImageRecord) {
        record.size = self.size;
        record.filter = self.filter;
        // modified_at must move forward even when two writes share a millisecond
        record.modified_at = self.modified_at.max(record.modified_at + 1);
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
