mod harnesses;

use harrow_core::config::{CommandTargetSettings, GeneratorKind, HarnessConfig, TargetType};
use harrow_core::{InProcessTarget, ResultStore, Runner, Target};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONFIG_FILE: &str = "harrow.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about = "Black-box fuzz-testing harness", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to ./harrow.toml when present)
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Program to run as a command target, replacing the configured one
    #[clap(long)]
    target_command: Option<String>,
    /// Number of cases to run
    #[clap(short = 'n', long)]
    cases: Option<usize>,
    /// Per-invocation deadline in milliseconds
    #[clap(short, long)]
    timeout_ms: Option<u64>,
    #[clap(short, long)]
    workers: Option<usize>,
    /// Seed for reproducible inputs
    #[clap(long)]
    seed: Option<u64>,
    /// Where to write the result file
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// Enable debug logging
    #[clap(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_file: Option<&PathBuf>) -> Result<HarnessConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            HarnessConfig::load_from_file(config_path)
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                info!("No config file specified via CLI, loading default: {default_config_path:?}");
                HarnessConfig::load_from_file(&default_config_path)
            } else {
                info!(
                    "No config file specified and default '{DEFAULT_CONFIG_FILE}' not found, using built-in defaults."
                );
                Ok(HarnessConfig::default())
            }
        }
    }
}

fn apply_overrides(config: &mut HarnessConfig, cli: &Cli) {
    if let Some(cases) = cli.cases {
        config.runner.case_count = cases;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.runner.timeout_ms = Some(timeout_ms);
    }
    if let Some(workers) = cli.workers {
        config.runner.workers = workers;
    }
    if let Some(seed) = cli.seed {
        config.generator.seed = Some(seed);
    }
    if let Some(output) = &cli.output {
        config.output.path = output.clone();
    }
    if let Some(target_cmd_str) = &cli.target_command {
        if config.target.target_type == TargetType::Command {
            let cmd_settings = config
                .target
                .command_settings
                .get_or_insert_with(CommandTargetSettings::default);
            if cmd_settings.command.is_empty() {
                cmd_settings.command.push(target_cmd_str.clone());
            } else {
                cmd_settings.command[0] = target_cmd_str.clone();
            }
        } else {
            warn!("--target-command specified but target type is not 'command'. Override ignored.");
        }
    }
}

fn build_target(config: &HarnessConfig) -> Result<Arc<dyn Target>, anyhow::Error> {
    let target: Arc<dyn Target> = match config.target.target_type {
        TargetType::Command => {
            let cmd_settings = config.target.command_settings.as_ref().ok_or_else(|| {
                anyhow::anyhow!("Command settings missing for command target type in config")
            })?;
            Arc::new(cmd_settings.build()?)
        }
        TargetType::InProcess => {
            let key = config
                .target
                .in_process_settings
                .clone()
                .unwrap_or_default()
                .harness_key;
            let harness = harnesses::lookup(&key).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown harness key '{key}'; expected one of {:?}",
                    harnesses::HARNESS_KEYS
                )
            })?;
            if config.generator.kind == GeneratorKind::Corpus {
                Arc::new(InProcessTarget::file_driven(key, harness))
            } else {
                Arc::new(InProcessTarget::new(key, harness))
            }
        }
    };
    Ok(target)
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config_file.as_ref())?;
    apply_overrides(&mut config, &cli);
    info!("Effective configuration: {config:#?}");

    let mut generator = config
        .generator
        .build()
        .context("Invalid generator configuration")?;
    let target = build_target(&config).context("Invalid target configuration")?;
    let runner = Runner::new(
        config
            .runner
            .to_runner_config()
            .context("Invalid runner configuration")?,
    );

    let session = runner.run(generator.as_mut(), target);
    let summary = session.summary();
    println!(
        "Cases: {}, Ok: {}, Errors: {}, Timeouts: {}, Clean exits: {}, Failing exits: {}, Failure rate: {:.1}%",
        summary.total,
        summary.ok,
        summary.errors,
        summary.timeouts,
        summary.clean_exits,
        summary.failing_exits,
        summary.failure_rate() * 100.0
    );

    ResultStore::save(&session, &config.output.path)
        .with_context(|| format!("Failed to save results to {:?}", config.output.path))?;
    println!("Results written to {:?}", config.output.path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use harrow_core::TargetKind;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("harrow").chain(args.iter().copied()))
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = HarnessConfig::default();
        let args = cli(&["-n", "7", "-t", "250", "-w", "3", "--seed", "42", "-o", "out.json"]);
        apply_overrides(&mut config, &args);
        assert_eq!(config.runner.case_count, 7);
        assert_eq!(config.runner.timeout_ms, Some(250));
        assert_eq!(config.runner.workers, 3);
        assert_eq!(config.generator.seed, Some(42));
        assert_eq!(config.output.path, PathBuf::from("out.json"));
    }

    #[test]
    fn target_command_only_applies_to_command_targets() {
        let mut config = HarnessConfig::default();
        apply_overrides(&mut config, &cli(&["--target-command", "cat"]));
        assert!(config.target.command_settings.is_none());

        config.target.target_type = TargetType::Command;
        apply_overrides(&mut config, &cli(&["--target-command", "cat"]));
        let target = build_target(&config).unwrap();
        assert_eq!(target.kind(), TargetKind::Process);
        assert_eq!(target.identity(), "cat");
    }

    #[test]
    fn default_config_targets_the_processor_harness() {
        let target = build_target(&HarnessConfig::default()).unwrap();
        assert_eq!(target.kind(), TargetKind::InProcess);
        assert_eq!(target.identity(), "processor");
    }

    #[test]
    fn corpus_generator_makes_a_file_driven_target() {
        let mut config = HarnessConfig::default();
        config.generator.kind = GeneratorKind::Corpus;
        let target = build_target(&config).unwrap();
        assert_eq!(target.kind(), TargetKind::FileDriven);
    }

    #[test]
    fn unknown_harness_key_is_rejected() {
        let config = HarnessConfig::from_toml_str(
            "[target.in-process-settings]\nharness-key = \"missing\"\n",
        )
        .unwrap();
        let err = build_target(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown harness key"));
    }

    #[test]
    fn command_target_without_settings_is_rejected() {
        let mut config = HarnessConfig::default();
        config.target.target_type = TargetType::Command;
        assert!(build_target(&config).is_err());
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[runner]\ncase-count = 3\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.runner.case_count, 3);
    }
}
