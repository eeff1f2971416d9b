use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::fmt;

/// A single value fed to the target under test.
///
/// Text inputs come from the random string generators or a line corpus;
/// records come from the structured generator. Serialized untagged, so a
/// result file shows a plain JSON string or a JSON object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Input {
    Text(String),
    Record(Map<String, JsonValue>),
}

impl Input {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Input::Text(s) => Some(s),
            Input::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&Map<String, JsonValue>> {
        match self {
            Input::Record(map) => Some(map),
            Input::Text(_) => None,
        }
    }

    /// Raw bytes handed to an external process. Records travel as compact JSON.
    pub fn to_payload(&self) -> Cow<'_, [u8]> {
        match self {
            Input::Text(s) => Cow::Borrowed(s.as_bytes()),
            Input::Record(map) => {
                Cow::Owned(JsonValue::Object(map.clone()).to_string().into_bytes())
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Input::Text(s) => s.len(),
            Input::Record(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Text(s) => f.write_str(s),
            Input::Record(map) => write!(f, "{}", JsonValue::Object(map.clone())),
        }
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Text(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Text(value.to_string())
    }
}

impl From<Map<String, JsonValue>> for Input {
    fn from(value: Map<String, JsonValue>) -> Self {
        Input::Record(value)
    }
}
