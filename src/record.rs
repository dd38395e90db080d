//! Tagged log records as handed over by the host.

use std::borrow::Cow;

use serde_json::Value;

/// Body field whose value is forwarded to the collector.
pub const MESSAGE_FIELD: &str = "message";

/// A record body together with the tag it was emitted under.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub tag: String,
    pub body: Value,
}

/// Records in the order the host delivered them.
pub type Batch = Vec<LogRecord>;

impl LogRecord {
    pub fn new(tag: impl Into<String>, body: Value) -> Self {
        Self {
            tag: tag.into(),
            body,
        }
    }

    /// Whether the body is a keyed mapping.
    pub fn is_mapping(&self) -> bool {
        self.body.is_object()
    }

    /// The text stored under [`MESSAGE_FIELD`], if the field is present.
    ///
    /// Strings are returned as is. Any other value is rendered as compact
    /// JSON, so `42` becomes `"42"` and `true` becomes `"true"`.
    pub fn message(&self) -> Option<Cow<'_, str>> {
        let value = self.body.as_object()?.get(MESSAGE_FIELD)?;
        Some(match value {
            Value::String(text) => Cow::Borrowed(text.as_str()),
            other => Cow::Owned(other.to_string()),
        })
    }
}

/// Wire line for a message: the message, one space, then the token.
pub fn format_line(message: &str, token: &str) -> String {
    let mut line = String::with_capacity(message.len() + token.len() + 1);
    line.push_str(message);
    line.push(' ');
    line.push_str(token);
    line
}
