use crate::input::Input;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error text recorded for an invocation that overran its deadline.
pub const TIMED_OUT: &str = "timed out";

/// Captured output of one external process run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How a single invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// An in-process target returned normally.
    Ok(String),
    /// An in-process target returned an error or panicked, or the harness
    /// could not launch a process target.
    Error(String),
    /// The invocation overran its deadline.
    Timeout,
    /// A process target ran to completion, whatever its exit code.
    Exited(ProcessOutput),
}

impl ExecutionStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            ExecutionStatus::Ok(_) => StatusKind::Ok,
            ExecutionStatus::Error(_) => StatusKind::Error,
            ExecutionStatus::Timeout => StatusKind::Timeout,
            ExecutionStatus::Exited(_) => StatusKind::Exited,
        }
    }

    /// True for errors, timeouts and non-zero exits.
    pub fn is_failure(&self) -> bool {
        match self {
            ExecutionStatus::Ok(_) => false,
            ExecutionStatus::Error(_) | ExecutionStatus::Timeout => true,
            ExecutionStatus::Exited(process) => !process.success(),
        }
    }
}

/// Discriminator written as the `status` field of every result record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StatusKind {
    Ok,
    Error,
    Timeout,
    Exited,
}

/// The recorded result of dispatching one input to one target invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    input: Input,
    status: ExecutionStatus,
}

impl Outcome {
    pub fn new(input: Input, status: ExecutionStatus) -> Self {
        Self { input, status }
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    pub fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    pub fn output(&self) -> Option<&str> {
        match &self.status {
            ExecutionStatus::Ok(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ExecutionStatus::Error(message) => Some(message),
            ExecutionStatus::Timeout => Some(TIMED_OUT),
            _ => None,
        }
    }

    pub fn process(&self) -> Option<&ProcessOutput> {
        match &self.status {
            ExecutionStatus::Exited(process) => Some(process),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.status == ExecutionStatus::Timeout
    }
}

// In-process records always carry both `output` and `error` (one of them
// null); process records carry `stdout`, `stderr` and `returncode` instead.
impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("input", &self.input)?;
        map.serialize_entry("status", &self.status.kind())?;
        match &self.status {
            ExecutionStatus::Exited(process) => {
                map.serialize_entry("stdout", &process.stdout)?;
                map.serialize_entry("stderr", &process.stderr)?;
                map.serialize_entry("returncode", &process.exit_code)?;
                if let Some(signal) = process.signal {
                    map.serialize_entry("signal", &signal)?;
                }
            }
            _ => {
                map.serialize_entry("output", &self.output())?;
                map.serialize_entry("error", &self.error())?;
            }
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OutcomeRecord {
    input: Input,
    status: StatusKind,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    returncode: Option<i32>,
    #[serde(default)]
    signal: Option<i32>,
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = OutcomeRecord::deserialize(deserializer)?;
        let status = match record.status {
            StatusKind::Ok => ExecutionStatus::Ok(
                record
                    .output
                    .ok_or_else(|| D::Error::missing_field("output"))?,
            ),
            StatusKind::Error => ExecutionStatus::Error(
                record
                    .error
                    .ok_or_else(|| D::Error::missing_field("error"))?,
            ),
            StatusKind::Timeout => ExecutionStatus::Timeout,
            StatusKind::Exited => ExecutionStatus::Exited(ProcessOutput {
                stdout: record.stdout.unwrap_or_default(),
                stderr: record.stderr.unwrap_or_default(),
                exit_code: record.returncode,
                signal: record.signal,
            }),
        };
        Ok(Outcome::new(record.input, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value as JsonValue, json};

    #[test]
    fn success_record_has_null_error() {
        let outcome =
            Outcome::new(Input::from("abc"), ExecutionStatus::Ok("Processed: abc".into()));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"input": "abc", "status": "ok", "output": "Processed: abc", "error": null})
        );
    }

    #[test]
    fn timeout_record_reads_as_error_text() {
        let outcome = Outcome::new(Input::from("slow"), ExecutionStatus::Timeout);
        assert!(outcome.is_timeout());
        assert_eq!(outcome.error(), Some(TIMED_OUT));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["output"], JsonValue::Null);
        assert_eq!(value["error"], json!("timed out"));
        assert_eq!(value["status"], json!("timeout"));
    }

    #[test]
    fn process_record_replaces_output_and_error() {
        let outcome = Outcome::new(
            Input::from("hello"),
            ExecutionStatus::Exited(ProcessOutput {
                stdout: "hello".into(),
                stderr: String::new(),
                exit_code: Some(0),
                signal: None,
            }),
        );
        let value = serde_json::to_value(&outcome).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("output"));
        assert!(!object.contains_key("error"));
        assert!(!object.contains_key("signal"));
        assert_eq!(value["returncode"], json!(0));
        assert_eq!(value["stdout"], json!("hello"));
    }

    #[test]
    fn failure_classification() {
        assert!(!ExecutionStatus::Ok("x".into()).is_failure());
        assert!(ExecutionStatus::Error("boom".into()).is_failure());
        assert!(ExecutionStatus::Timeout.is_failure());
        let clean = ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        let failing = ProcessOutput {
            exit_code: Some(2),
            ..Default::default()
        };
        assert!(!ExecutionStatus::Exited(clean).is_failure());
        assert!(ExecutionStatus::Exited(failing).is_failure());
    }

    #[test]
    fn records_deserialize_back_to_outcomes() {
        let killed = Outcome::new(
            Input::from("x"),
            ExecutionStatus::Exited(ProcessOutput {
                stdout: String::new(),
                stderr: "segfault".into(),
                exit_code: None,
                signal: Some(11),
            }),
        );
        let text = serde_json::to_string(&killed).unwrap();
        let back: Outcome = serde_json::from_str(&text).unwrap();
        assert_eq!(back, killed);

        let bad = json!({"input": "x", "status": "ok", "error": null});
        assert!(serde_json::from_value::<Outcome>(bad).is_err());
    }
}
