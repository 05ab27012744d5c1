use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message relayed from producers to consumers.
///
/// Stored in the queue and sent to consumers as a flat JSON object.
/// Fields other than `type` and `content` are carried through untouched.
///
/// # Example
///
/// ```rust
/// use poprelay::relay::message::Message;
///
/// let msg = Message::new("serviceB", "hello");
/// let json = serde_json::to_string(&msg).unwrap();
/// assert_eq!(json, r#"{"type":"serviceB","content":"hello"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Routing type checked by the consumer filter. Entries written by older
    /// producers may lack it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub content: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    pub fn new(kind: &str, content: &str) -> Self {
        Self {
            kind: Some(kind.to_string()),
            content: content.to_string(),
            extra: Map::new(),
        }
    }
}
