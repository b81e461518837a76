//! Signed-in user session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the identity provider hands back after verifying credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub is_authenticated: bool,
}

impl UserSession {
    pub fn from_identity(identity: &Identity) -> Self {
        Self {
            id: identity.uid.clone(),
            name: identity.display_name.clone(),
            email: identity.email.clone(),
            image: identity.photo_url.clone(),
            is_authenticated: true,
        }
    }
}

/// Contents of the `details` profile document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDetails {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub mobile: Option<String>,
    pub created_on: DateTime<Utc>,
}

impl ProfileDetails {
    pub fn from_identity(identity: &Identity, created_on: DateTime<Utc>) -> Self {
        Self {
            id: identity.uid.clone(),
            name: identity.display_name.clone(),
            email: identity.email.clone(),
            image: identity.photo_url.clone(),
            mobile: identity.phone_number.clone(),
            created_on,
        }
    }
}
