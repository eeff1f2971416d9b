use crate::corpus::LineCorpus;
use crate::generator::{FieldCandidates, Generator, RandomStringGenerator, StructuredGenerator};
use crate::runner::RunnerConfig;
use crate::target::{CommandTarget, CommandTargetConfig, InputDelivery};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GeneratorKind {
    #[default]
    RandomString,
    ShellSafe,
    Structured,
    Corpus,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct GeneratorSettings {
    #[serde(default)]
    pub kind: GeneratorKind,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Field name to candidate values, for the structured generator. Fields
    /// are drawn and written in name order, whatever order the file uses.
    #[serde(default)]
    pub candidate_sets: BTreeMap<String, Vec<JsonValue>>,
    /// Fields that may also draw a null. TOML has no null literal.
    #[serde(default)]
    pub nullable: Vec<String>,
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,
}

pub fn default_max_length() -> usize {
    100
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::default(),
            max_length: default_max_length(),
            seed: None,
            candidate_sets: BTreeMap::new(),
            nullable: Vec::new(),
            corpus_path: None,
        }
    }
}

impl GeneratorSettings {
    /// Builds the configured generator. Invalid parameters fail here, before
    /// any input is drawn.
    pub fn build(&self) -> Result<Box<dyn Generator>, anyhow::Error> {
        let generator: Box<dyn Generator> = match self.kind {
            GeneratorKind::RandomString => {
                Box::new(RandomStringGenerator::new(self.max_length, self.seed)?)
            }
            GeneratorKind::ShellSafe => {
                Box::new(RandomStringGenerator::shell_safe(self.max_length, self.seed)?)
            }
            GeneratorKind::Structured => {
                if let Some(unknown) = self
                    .nullable
                    .iter()
                    .find(|f| !self.candidate_sets.contains_key(*f))
                {
                    anyhow::bail!("nullable field '{unknown}' has no candidate set");
                }
                let fields = self
                    .candidate_sets
                    .iter()
                    .map(|(field, values)| {
                        let mut candidates = values.clone();
                        if self.nullable.contains(field) {
                            candidates.push(JsonValue::Null);
                        }
                        FieldCandidates::new(field.clone(), candidates)
                    })
                    .collect();
                Box::new(StructuredGenerator::new(fields, self.seed)?)
            }
            GeneratorKind::Corpus => {
                let path = self
                    .corpus_path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("corpus-path missing for corpus generator"))?;
                Box::new(LineCorpus::from_path(path)?)
            }
        };
        Ok(generator)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RunnerSettings {
    #[serde(default = "default_case_count")]
    pub case_count: usize,
    /// Per-invocation deadline; absent means unbounded.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

pub fn default_case_count() -> usize {
    100
}
pub fn default_workers() -> usize {
    1
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            case_count: default_case_count(),
            timeout_ms: None,
            workers: default_workers(),
        }
    }
}

impl RunnerSettings {
    pub fn to_runner_config(&self) -> Result<RunnerConfig, anyhow::Error> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.timeout_ms == Some(0) {
            anyhow::bail!("timeout-ms must be positive; omit it for no deadline");
        }
        Ok(RunnerConfig {
            case_count: self.case_count,
            timeout: self.timeout_ms.map(Duration::from_millis),
            workers: self.workers,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigInputDelivery {
    #[default]
    StdIn,
    File {
        template: String,
    },
    Argument,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CommandTargetSettings {
    pub command: Vec<String>,
    #[serde(default)]
    pub input_delivery: ConfigInputDelivery,
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl CommandTargetSettings {
    pub fn build(&self) -> Result<CommandTarget, anyhow::Error> {
        let input_delivery = match &self.input_delivery {
            ConfigInputDelivery::StdIn => InputDelivery::StdIn,
            ConfigInputDelivery::File { template } => InputDelivery::File(template.clone()),
            ConfigInputDelivery::Argument => InputDelivery::Argument,
        };
        let mut envs: Vec<(String, String)> = self.env.clone().into_iter().collect();
        envs.sort();
        Ok(CommandTarget::new(CommandTargetConfig {
            command: self.command.clone(),
            input_delivery,
            working_dir: self.working_dir.clone(),
            envs,
        })?)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    #[default]
    InProcess,
    Command,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct InProcessTargetSettings {
    #[serde(default = "default_harness_key")]
    pub harness_key: String,
}

pub fn default_harness_key() -> String {
    "processor".to_string()
}

impl Default for InProcessTargetSettings {
    fn default() -> Self {
        Self {
            harness_key: default_harness_key(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default)]
    pub target_type: TargetType,
    #[serde(default)]
    pub command_settings: Option<CommandTargetSettings>,
    #[serde(default)]
    pub in_process_settings: Option<InProcessTargetSettings>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

pub fn default_output_path() -> PathBuf {
    PathBuf::from("fuzz_results.json")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub output: OutputSettings,
}

impl HarnessConfig {
    /// Loads a config file. A relative `corpus-path` is taken relative to the
    /// directory holding the file, not the current directory.
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;
        let mut config = Self::from_toml_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if let Some(corpus_path) = &mut self.generator.corpus_path {
            if corpus_path.is_relative() {
                *corpus_path = base.join(&*corpus_path);
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
