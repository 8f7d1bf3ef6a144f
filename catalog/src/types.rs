use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive fields supplied when enrolling a new person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub full_name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub address: Option<String>,

    /// Most recently enrolled face image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Vec<u8>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Build a new record. A missing name becomes `"Person {id}"`.
    pub fn new(id: i64, profile: Profile, avatar: Option<Vec<u8>>) -> Self {
        let now = Utc::now();
        Self {
            id,
            full_name: profile
                .full_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Person {id}")),
            age: profile.age,
            gender: profile.gender,
            address: profile.address,
            avatar,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A partial update of an [`Identity`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityUpdate {
    pub full_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub avatar: Option<Vec<u8>>,
}

impl IdentityUpdate {
    /// An update that only replaces the avatar.
    pub fn avatar(bytes: Vec<u8>) -> Self {
        Self {
            avatar: Some(bytes),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.address.is_none()
            && self.avatar.is_none()
    }

    /// Apply the update in place and bump `updated_at`.
    pub fn apply(self, identity: &mut Identity) {
        if let Some(v) = self.full_name {
            identity.full_name = v;
        }
        if let Some(v) = self.age {
            identity.age = Some(v);
        }
        if let Some(v) = self.gender {
            identity.gender = Some(v);
        }
        if let Some(v) = self.address {
            identity.address = Some(v);
        }
        if let Some(v) = self.avatar {
            identity.avatar = Some(v);
        }
        identity.updated_at = Utc::now();
    }
}

/// A face image to store. When `image_id` is `None` the store assigns the
/// next free id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub image_id: Option<i64>,
    pub identity_id: i64,
    pub bytes: Vec<u8>,
}

/// A stored face image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceImage {
    pub image_id: i64,
    pub identity_id: i64,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}
