use serde::{Deserialize, Serialize};

pub const SYSTEM_VERSION_SETTING: &str = "system_version";

/// Onboarding steps flagged complete after every successful update.
pub const WIZARD_CHECKMARK_SETTINGS: [&str; 8] = [
    "wizard_checkMark",
    "system_settings_wizard_checkMark",
    "notification_settings_wizard_checkMark",
    "email_settings_wizard_checkMark",
    "verify_email_wizard_checkMark",
    "email_template_settings_wizard_checkMark",
    "payment_settings_wizard_checkMark",
    "third_party_api_settings_wizard_checkMark",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Setting {
    pub name: String,
    pub data: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Setting {
    pub fn new(name: impl Into<String>, data: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            kind: kind.into(),
        }
    }
}

pub fn wizard_checkmark_settings() -> Vec<Setting> {
    WIZARD_CHECKMARK_SETTINGS
        .iter()
        .map(|name| Setting::new(*name, "1", "integer"))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateMetadata {
    pub version: u32,
    pub txid: String,
    pub package: String,
    pub status: String,
    pub started_at_unix: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateJournalEntry {
    pub seq: u64,
    pub step: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReceipt {
    pub txid: String,
    pub package: String,
    pub package_sha256: Option<String>,
    pub from_version: String,
    pub to_version: String,
    pub installed_at_unix: u64,
}
