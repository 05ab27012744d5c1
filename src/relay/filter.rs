use crate::config::FilterSettings;
use crate::relay::message::Message;

pub const ALLOW_ALL: &str = "allow_all";
pub const SPECIFIC_TYPE: &str = "specific_type";

/// Decides which messages a consumer session receives.
///
/// Anything that is not a recognized, complete configuration becomes
/// `Unknown` and rejects every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    AllowAll,
    SpecificType(String),
    Unknown(String),
}

impl MessageFilter {
    pub fn new(mode: &str, filter_type: Option<&str>) -> Self {
        match (mode, filter_type) {
            (ALLOW_ALL, _) => MessageFilter::AllowAll,
            (SPECIFIC_TYPE, Some(kind)) => MessageFilter::SpecificType(kind.to_string()),
            (other, _) => MessageFilter::Unknown(other.to_string()),
        }
    }

    pub fn from_settings(settings: &FilterSettings) -> Self {
        Self::new(&settings.mode, settings.filter_type.as_deref())
    }

    pub fn admits(&self, message: &Message) -> bool {
        match self {
            MessageFilter::AllowAll => true,
            MessageFilter::SpecificType(kind) => message.kind.as_deref() == Some(kind.as_str()),
            MessageFilter::Unknown(_) => false,
        }
    }
}
