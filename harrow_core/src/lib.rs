pub mod config;
pub mod corpus;
pub mod generator;
pub mod input;
pub mod outcome;
pub mod runner;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod target;

pub use config::HarnessConfig;
pub use corpus::{CorpusError, LineCorpus};
pub use generator::{
    Batch, Charset, FieldCandidates, Generator, GeneratorError, RandomStringGenerator,
    StructuredGenerator,
};
pub use input::Input;
pub use outcome::{ExecutionStatus, Outcome, ProcessOutput, StatusKind};
pub use runner::{Runner, RunnerConfig};
pub use session::{Session, SessionConfig, SessionSummary};
pub use store::{ResultStore, StoreError};
pub use supervisor::invoke_with_timeout;
pub use target::{
    CommandTarget, CommandTargetConfig, InProcessTarget, InputDelivery, Target, TargetError,
    TargetKind,
};
