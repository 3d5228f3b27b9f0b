//! A self-contained fuzzing loop for running the harness without libFuzzer.

use crate::config::CampaignSettings;
use crate::corpus::{Corpus, CorpusError, EntryOrigin};
use crate::executor::{ExecutionStatus, Executor};
use crate::input::Input;
use crate::mutator::Mutator;
use crate::oracle::{BugReport, Oracle};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::marker::PhantomData;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    IterationBudget,
    DeadlineReached { elapsed_minutes: u64 },
    CrashFound,
    Fatal(String),
}

#[derive(Debug)]
pub struct CampaignSummary<I: Input> {
    pub iterations: u64,
    pub dispatched: u64,
    pub rejected: u64,
    pub mutation_failures: u64,
    pub corpus_size: usize,
    pub stop_reason: StopReason,
    pub bug: Option<BugReport<I>>,
    pub artifact: Option<PathBuf>,
}

impl<I: Input> CampaignSummary<I> {
    fn new(stop_reason: StopReason) -> Self {
        Self {
            iterations: 0,
            dispatched: 0,
            rejected: 0,
            mutation_failures: 0,
            corpus_size: 0,
            stop_reason,
            bug: None,
            artifact: None,
        }
    }
}

pub struct Campaign<I, C, M, E, O>
where
    I: Input,
    C: Corpus<I>,
    M: Mutator<I, ChaCha8Rng>,
    E: Executor<I>,
    O: Oracle<I>,
{
    corpus: C,
    mutator: M,
    executor: E,
    oracle: O,
    rng: ChaCha8Rng,
    max_iterations: u64,
    artifacts_dir: Option<PathBuf>,
    _marker: PhantomData<I>,
}

impl<I, C, M, E, O> Campaign<I, C, M, E, O>
where
    I: Input,
    C: Corpus<I>,
    M: Mutator<I, ChaCha8Rng>,
    E: Executor<I>,
    O: Oracle<I>,
{
    pub fn new(corpus: C, mutator: M, executor: E, oracle: O, settings: &CampaignSettings) -> Self {
        Self {
            corpus,
            mutator,
            executor,
            oracle,
            rng: ChaCha8Rng::seed_from_u64(settings.rng_seed),
            max_iterations: settings.iterations,
            artifacts_dir: Some(settings.artifacts_dir.clone()),
            _marker: PhantomData,
        }
    }

    /// Crash artifacts are not written when `dir` is `None`.
    pub fn with_artifacts_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.artifacts_dir = dir;
        self
    }

    pub fn corpus(&self) -> &C {
        &self.corpus
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Runs select, mutate, execute and examine until the iteration budget is
    /// spent, the deadline passes, or the first crash is found.
    pub fn run(&mut self) -> Result<CampaignSummary<I>, CorpusError> {
        let mut summary = CampaignSummary::new(StopReason::IterationBudget);

        while summary.iterations < self.max_iterations {
            let (parent, base) = match self.corpus.random_select(&mut self.rng) {
                Some((id, entry)) => (Some(id), Some(entry.input.clone())),
                None => (None, None),
            };
            let candidate = match self.mutator.mutate(base.as_ref(), &mut self.rng) {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!("Mutation failed: {:#}", e);
                    summary.mutation_failures += 1;
                    summary.iterations += 1;
                    continue;
                }
            };

            let status = self.executor.execute_sync(&candidate);
            if let ExecutionStatus::CampaignExpired { elapsed_minutes } = status {
                tracing::info!("Stopping fuzzing after {} minutes", elapsed_minutes);
                summary.stop_reason = StopReason::DeadlineReached { elapsed_minutes };
                break;
            }
            summary.iterations += 1;

            match &status {
                ExecutionStatus::Ok => {
                    summary.dispatched += 1;
                    let origin = match parent {
                        Some(parent) => EntryOrigin::Mutation { parent },
                        None => EntryOrigin::Builtin("generated"),
                    };
                    self.corpus.add_if_novel(candidate, origin)?;
                }
                ExecutionStatus::Rejected => summary.rejected += 1,
                ExecutionStatus::CampaignExpired { .. } => {}
                ExecutionStatus::Fatal(msg) => {
                    tracing::error!("Harness initialization failed: {}", msg);
                    summary.stop_reason = StopReason::Fatal(msg.clone());
                    break;
                }
                ExecutionStatus::Crash(_) => {
                    if let Some(report) = self.oracle.examine(&candidate, &status) {
                        tracing::error!(
                            hash = %report.input_hash,
                            "Crash found: {}",
                            report.description
                        );
                        if let Some(dir) = &self.artifacts_dir {
                            let path = report.write_artifact(dir)?;
                            tracing::info!("Wrote crash artifact to {:?}", path);
                            summary.artifact = Some(path);
                        }
                        summary.bug = Some(report);
                    }
                    summary.dispatched += 1;
                    summary.stop_reason = StopReason::CrashFound;
                    break;
                }
            }
        }

        summary.corpus_size = self.corpus.len();
        tracing::info!(
            iterations = summary.iterations,
            dispatched = summary.dispatched,
            rejected = summary.rejected,
            corpus = summary.corpus_size,
            stop = ?summary.stop_reason,
            "Campaign finished"
        );
        Ok(summary)
    }
}
