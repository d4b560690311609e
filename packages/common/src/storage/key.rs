#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::StorageError;

/// Longest accepted key segment, in bytes.
const MAX_SEGMENT_LEN: usize = 255;

/// Kind of content entity an asset can be attached to.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "post"))]
    Post,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "event"))]
    Event,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "report"))]
    Report,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "comment"))]
    Comment,
    /// A user's avatar slot. The entity id is the user id.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "avatar"))]
    Avatar,
}

impl EntityType {
    pub const ALL: &'static [EntityType] = &[
        Self::Post,
        Self::Event,
        Self::Report,
        Self::Comment,
        Self::Avatar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Event => "event",
            Self::Report => "report",
            Self::Comment => "comment",
            Self::Avatar => "avatar",
        }
    }

    /// Entities with a rich-text body. Avatars hold a single slot instead.
    pub fn has_body(&self) -> bool {
        !matches!(self, Self::Avatar)
    }

    pub fn namespace(self) -> Namespace {
        Namespace::Entity(self)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StorageError::InvalidKey(format!("unknown entity type '{s}'")))
    }
}

/// Path segment identifying where an asset currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Staging area for uploads not yet bound to an entity.
    Temp,
    Entity(EntityType),
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Entity(entity_type) => entity_type.as_str(),
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "temp" {
            Ok(Self::Temp)
        } else {
            s.parse().map(Self::Entity)
        }
    }
}

/// Validates a single key segment (owner id, entity id or filename).
pub fn validate_segment(segment: &str) -> Result<&str, StorageError> {
    if segment.is_empty() {
        return Err(StorageError::InvalidKey("empty segment".into()));
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return Err(StorageError::InvalidKey(format!(
            "segment exceeds {MAX_SEGMENT_LEN} bytes"
        )));
    }
    if segment.starts_with('.') {
        return Err(StorageError::InvalidKey(format!(
            "segment '{segment}' must not start with '.'"
        )));
    }
    if segment
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(StorageError::InvalidKey(format!(
            "segment '{}' contains a separator or control character",
            segment.escape_default()
        )));
    }
    Ok(segment)
}

/// Hierarchical object key.
///
/// Staged objects live at `{owner}/temp/{filename}`; objects bound to an
/// entity live at `{owner}/{namespace}/{entity_id}/{filename}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageKey {
    owner_id: String,
    namespace: Namespace,
    entity_id: Option<String>,
    filename: String,
}

impl StorageKey {
    pub fn staged(owner_id: &str, filename: &str) -> Result<Self, StorageError> {
        Ok(Self {
            owner_id: validate_segment(owner_id)?.to_string(),
            namespace: Namespace::Temp,
            entity_id: None,
            filename: validate_segment(filename)?.to_string(),
        })
    }

    pub fn for_entity(
        owner_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        filename: &str,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            owner_id: validate_segment(owner_id)?.to_string(),
            namespace: Namespace::Entity(entity_type),
            entity_id: Some(validate_segment(entity_id)?.to_string()),
            filename: validate_segment(filename)?.to_string(),
        })
    }

    /// Same owner and filename, relocated under the given entity.
    pub fn with_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Self, StorageError> {
        Self::for_entity(&self.owner_id, entity_type, entity_id, &self.filename)
    }

    /// Parse a key of the form `owner/temp/file` or `owner/ns/entity/file`.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let parts: Vec<&str> = raw.split('/').collect();
        match parts.as_slice() {
            [owner, "temp", filename] => Self::staged(owner, filename),
            [owner, namespace, entity_id, filename] => match namespace.parse()? {
                Namespace::Temp => Err(StorageError::InvalidKey(format!(
                    "staged key '{raw}' must not carry an entity id"
                ))),
                Namespace::Entity(entity_type) => {
                    Self::for_entity(owner, entity_type, entity_id, filename)
                }
            },
            _ => Err(StorageError::InvalidKey(format!(
                "'{raw}' does not match owner/namespace/[entity/]filename"
            ))),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Whether this key sits under `(entity_type, entity_id)`.
    pub fn belongs_to(&self, entity_type: EntityType, entity_id: &str) -> bool {
        self.namespace == Namespace::Entity(entity_type)
            && self.entity_id.as_deref() == Some(entity_id)
    }

    /// Key prefix covering every object of `owner_id` in `namespace`.
    pub fn prefix(owner_id: &str, namespace: Namespace) -> String {
        format!("{owner_id}/{namespace}/")
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity_id {
            Some(entity_id) => write!(
                f,
                "{}/{}/{}/{}",
                self.owner_id, self.namespace, entity_id, self.filename
            ),
            None => write!(f, "{}/{}/{}", self.owner_id, self.namespace, self.filename),
        }
    }
}

impl FromStr for StorageKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
