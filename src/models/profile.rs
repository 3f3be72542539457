use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Role-specific profile fields. Serialized inline next to the common ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProfileDetails {
    Student {
        grade: Option<String>,
        school: Option<String>,
    },
    Teacher {
        subject: Option<String>,
        experience_years: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileUpdate {
    pub user_id: String,
    pub name: String,
    pub gender: Option<Gender>,
    pub age: Option<u32>,
    #[serde(flatten)]
    pub details: ProfileDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub school: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub experience_years: Option<u32>,
}

/// The `{success, message}` envelope used by the profile endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiAck {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}
