use crate::generator::{Batch, Generator};
use crate::input::Input;
use crate::outcome::{ExecutionStatus, Outcome};
use crate::session::{Session, SessionConfig};
use crate::supervisor::invoke_with_timeout;
use crate::target::Target;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub case_count: usize,
    /// Per-invocation deadline. `None` lets a target block indefinitely.
    pub timeout: Option<Duration>,
    pub workers: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            case_count: 100,
            timeout: None,
            workers: 1,
        }
    }
}

/// Orchestrates one fuzzing session.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Draws up to `case_count` inputs from `generator`, dispatches each to
    /// `target` and returns one outcome per drawn input, in draw order.
    ///
    /// Target errors, timeouts and non-zero exits are recorded, never
    /// propagated, so the run always completes.
    pub fn run<G>(&self, generator: &mut G, target: Arc<dyn Target>) -> Session
    where
        G: Generator + ?Sized,
    {
        let generator_name = generator.name().to_string();
        let inputs: Vec<Input> = Batch::new(generator, self.config.case_count).collect();
        let workers = self.config.workers.max(1).min(inputs.len().max(1));

        info!(
            generator = %generator_name,
            target = %target.identity(),
            kind = %target.kind(),
            cases = inputs.len(),
            workers,
            timeout = ?self.config.timeout,
            "starting fuzz session"
        );
        let start_time = Instant::now();

        let outcomes = if workers == 1 {
            self.run_sequential(inputs, &target, start_time)
        } else {
            self.run_parallel(inputs, &target, workers, start_time)
        };

        let elapsed = start_time.elapsed();
        let session = Session::new(
            SessionConfig {
                generator: generator_name,
                case_count: self.config.case_count,
                timeout: self.config.timeout,
                target: target.identity(),
                target_kind: target.kind(),
                workers,
            },
            outcomes,
        );
        let summary = session.summary();
        info!(
            total = summary.total,
            ok = summary.ok,
            errors = summary.errors,
            timeouts = summary.timeouts,
            failing_exits = summary.failing_exits,
            "fuzz session finished in {elapsed:.2?}"
        );
        session
    }

    fn dispatch(&self, target: &Arc<dyn Target>, input: &Input) -> ExecutionStatus {
        match self.config.timeout {
            Some(deadline) => invoke_with_timeout(target, input, deadline),
            None => target.invoke(input),
        }
    }

    fn run_sequential(
        &self,
        inputs: Vec<Input>,
        target: &Arc<dyn Target>,
        start_time: Instant,
    ) -> Vec<Outcome> {
        let progress = Progress::new(inputs.len(), start_time);
        let mut outcomes = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.into_iter().enumerate() {
            let status = self.dispatch(target, &input);
            debug!(case = i, status = ?status.kind(), "invocation finished");
            outcomes.push(Outcome::new(input, status));

            progress.record();
        }
        outcomes
    }

    /// Workers claim input indices from a shared counter and write each
    /// outcome into the slot of its input, so completion order never leaks
    /// into the session.
    fn run_parallel(
        &self,
        inputs: Vec<Input>,
        target: &Arc<dyn Target>,
        workers: usize,
        start_time: Instant,
    ) -> Vec<Outcome> {
        let progress = Progress::new(inputs.len(), start_time);
        let next_index = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<ExecutionStatus>>> = Mutex::new(vec![None; inputs.len()]);

        thread::scope(|scope| {
            for worker in 0..workers {
                let inputs = &inputs;
                let next_index = &next_index;
                let slots = &slots;
                let progress = &progress;
                scope.spawn(move || {
                    loop {
                        let i = next_index.fetch_add(1, Ordering::SeqCst);
                        let Some(input) = inputs.get(i) else {
                            break;
                        };
                        let status = self.dispatch(target, input);
                        debug!(worker, case = i, status = ?status.kind(), "invocation finished");
                        let mut guard = slots.lock().unwrap_or_else(|e| e.into_inner());
                        guard[i] = Some(status);
                        drop(guard);
                        progress.record();
                    }
                });
            }
        });

        let slots = slots.into_inner().unwrap_or_else(|e| e.into_inner());
        inputs
            .into_iter()
            .zip(slots)
            .map(|(input, status)| {
                let status = status.unwrap_or_else(|| {
                    ExecutionStatus::Error("invocation worker exited without reporting".to_string())
                });
                Outcome::new(input, status)
            })
            .collect()
    }
}

/// Counts finished invocations across workers and logs throughput roughly
/// every 1% of the session.
struct Progress {
    total: usize,
    report_every: usize,
    completed: AtomicUsize,
    start_time: Instant,
}

impl Progress {
    fn new(total: usize, start_time: Instant) -> Self {
        Self {
            total,
            report_every: (total / 100).max(1),
            completed: AtomicUsize::new(0),
            start_time,
        }
    }

    /// Marks one invocation finished. Returns the execution count when a
    /// progress line was logged for it.
    fn record(&self) -> Option<usize> {
        let executions = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if executions % self.report_every != 0 || executions >= self.total {
            return None;
        }
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let exec_per_sec = if elapsed > 0.0 {
            executions as f32 / elapsed
        } else {
            0.0
        };
        info!("Iter: {executions}/{}, Execs/sec: {exec_per_sec:.2}", self.total);
        Some(executions)
    }
}
