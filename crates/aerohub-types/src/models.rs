use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Upload form limits, enforced before anything reaches the store.
pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_IMAGES: usize = 5;
pub const MAX_TEXTURE_FIELD_LEN: usize = 50;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Store-assigned livery identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveryId(pub i64);

impl fmt::Display for LiveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for LiveryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(LiveryId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureId {
    pub name: String,
    pub id: String,
}

/// A community livery as the store returns it.
///
/// `likes`, `saves` and `views` are owned by the store. Any copy held here
/// is provisional until the next server response replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Livery {
    pub id: LiveryId,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vehicle_name: String,
    #[serde(default)]
    pub vehicle_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub texture_ids: Vec<TextureId>,
    #[serde(default)]
    pub advanced_customization: Option<serde_json::Value>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub saves: u64,
    #[serde(default)]
    pub views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Livery {
    /// The first image is the cover shown on cards.
    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// A user record as synced from the identity provider.
///
/// The store keeps liked/saved livery ids as arrays; they are decoded into
/// sets so per-livery UI state is a constant-time lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub likes: HashSet<LiveryId>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub saves: HashSet<LiveryId>,
}

impl UserProfile {
    pub fn has_liked(&self, id: LiveryId) -> bool {
        self.likes.contains(&id)
    }

    pub fn has_saved(&self, id: LiveryId) -> bool {
        self.saves.contains(&id)
    }
}

/// Profile card aggregate. Sub-metrics that could not be read are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub username: String,
    pub image_url: String,
    pub livery_count: u64,
    pub total_likes: u64,
    pub total_saves: u64,
}

/// Insert payload. The owner is always the calling user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLivery {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub vehicle_name: String,
    pub vehicle_type: String,
    pub images: Vec<String>,
    pub texture_ids: Vec<TextureId>,
    pub advanced_customization: Option<serde_json::Value>,
}

/// Owner edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture_ids: Option<Vec<TextureId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_customization: Option<Option<serde_json::Value>>,
}

impl LiveryPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply this patch to a local copy, the way the store does.
    pub fn apply_to(&self, livery: &mut Livery) {
        if let Some(title) = &self.title {
            livery.title = title.clone();
        }
        if let Some(description) = &self.description {
            livery.description = description.clone();
        }
        if let Some(vehicle_name) = &self.vehicle_name {
            livery.vehicle_name = vehicle_name.clone();
        }
        if let Some(vehicle_type) = &self.vehicle_type {
            livery.vehicle_type = vehicle_type.clone();
        }
        if let Some(images) = &self.images {
            livery.images = images.clone();
        }
        if let Some(texture_ids) = &self.texture_ids {
            livery.texture_ids = texture_ids.clone();
        }
        if let Some(advanced) = &self.advanced_customization {
            livery.advanced_customization = advanced.clone();
        }
    }
}

/// Treat a JSON `null` the same as a missing collection.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_profile_decodes_null_arrays_as_empty_sets() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"id":"user_1","username":"mell","image_url":"","likes":null,"saves":[3,7]}"#,
        )
        .unwrap();

        assert!(profile.likes.is_empty());
        assert!(profile.has_saved(LiveryId(7)));
        assert!(!profile.has_liked(LiveryId(7)));
    }

    #[test]
    fn livery_decodes_store_row() {
        let livery: Livery = serde_json::from_str(
            r#"{
                "id": 12,
                "user_id": "user_1",
                "title": "EVA Air Laminar",
                "description": null,
                "vehicle_name": "A330-300",
                "vehicle_type": "A330-300",
                "images": ["https://cdn/a.png", "https://cdn/b.png"],
                "texture_ids": [{"name": "Fuselage", "id": "123"}],
                "advanced_customization": null,
                "likes": 4,
                "saves": 1,
                "views": 90,
                "created_at": "2024-10-01T12:00:00.123456+00:00",
                "updated_at": "2024-10-02T08:30:00+00:00"
            }"#,
        )
        .unwrap();

        assert_eq!(livery.id, LiveryId(12));
        assert_eq!(livery.cover_image(), Some("https://cdn/a.png"));
        assert_eq!(livery.texture_ids[0].name, "Fuselage");
    }

    #[test]
    fn patch_skips_untouched_fields() {
        let patch = LiveryPatch {
            title: Some("New title".into()),
            description: Some(None),
            ..Default::default()
        };

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"title": "New title", "description": null}));
        assert!(!patch.is_empty());
        assert!(LiveryPatch::default().is_empty());
    }
}
