//! The mutation pipeline
//!
//! Runs a registry's hooks over every candidate of a reconciliation pass and
//! aggregates what came out. Per candidate:
//!
//! - no usable context: the candidate passes through (`ShortCircuited`)
//! - no registered hook: the candidate passes through (`Unchanged`)
//! - hooks registered: they run in registration order, each on every output
//!   of the previous one; the flattened result replaces the candidate
//! - a hook fails: nothing derived from the candidate is emitted, the error
//!   is collected and the other candidates carry on
//! - the context is cancelled: the candidate is reported as cancelled and
//!   contributes no objects
//!
//! Output order follows input order, with fan-out outputs in place of their
//! candidate.

use std::sync::Arc;
use std::time::Instant;

use kube::api::DynamicObject;
use tracing::{debug, instrument, warn};

use rigging_common::metrics;

use crate::context::{usable, MutationContext};
use crate::error::PipelineError;
use crate::identity::ObjectIdentity;
use crate::registry::{MutationRegistry, RegisteredHook};

/// What happened to a single candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CandidateState {
    /// No hook registered; emitted as-is
    Unchanged,
    /// No usable context; emitted as-is without consulting the registry
    ShortCircuited,
    /// Hooks ran; their outputs replace the candidate
    Mutated,
    /// A hook failed; nothing emitted
    Failed,
    /// The pass was cancelled before the candidate finished; nothing emitted
    Cancelled,
}

impl CandidateState {
    /// Metric label for this state
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::ShortCircuited => "short_circuited",
            Self::Mutated => "mutated",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CandidateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-candidate record of a pipeline run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateOutcome {
    /// The candidate
    pub identity: ObjectIdentity,
    /// What happened to it
    pub state: CandidateState,
    /// Hooks that completed on every object they were given before the
    /// candidate finished, failed or was cancelled
    pub hooks_run: usize,
    /// Objects it contributed to the output
    pub produced: usize,
}

/// Aggregate result of a pipeline run
#[derive(Clone, Debug, Default)]
pub struct MutationOutput {
    /// Final objects, in candidate order
    pub objects: Vec<DynamicObject>,
    /// One error per failed or cancelled candidate, in candidate order
    pub errors: Vec<PipelineError>,
    /// One outcome per candidate, in candidate order
    pub outcomes: Vec<CandidateOutcome>,
}

impl MutationOutput {
    /// Whether every candidate completed without error
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any candidate was cut short by cancellation
    pub fn is_cancelled(&self) -> bool {
        self.errors.iter().any(PipelineError::is_cancellation)
    }

    /// Errors that are hook failures rather than cancellations
    pub fn failures(&self) -> impl Iterator<Item = &PipelineError> {
        self.errors.iter().filter(|e| !e.is_cancellation())
    }

    /// Number of candidates that ended in `state`
    pub fn count(&self, state: CandidateState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// The objects if the run was clean, the first error otherwise
    pub fn into_result(self) -> Result<Vec<DynamicObject>, PipelineError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.objects),
        }
    }
}

/// Result of running one candidate's hook chain
pub(crate) enum ChainOutcome {
    Done {
        objects: Vec<DynamicObject>,
        hooks_run: usize,
    },
    Failed {
        error: PipelineError,
        hooks_run: usize,
    },
}

/// Run `hooks` in order over `candidate`, each hook on every output of the
/// previous one. Cancellation is checked before every hook invocation.
pub(crate) fn run_chain<P, C>(
    hooks: &[RegisteredHook<P, C>],
    candidate: DynamicObject,
    identity: &ObjectIdentity,
    parent: &P,
    collection: &C,
    ctx: &MutationContext,
) -> ChainOutcome {
    let mut current = vec![candidate];
    let mut hooks_run = 0;

    for registered in hooks {
        let mut next = Vec::with_capacity(current.len());
        for obj in &current {
            if ctx.is_cancelled() {
                return ChainOutcome::Failed {
                    error: PipelineError::Cancelled {
                        identity: identity.clone(),
                    },
                    hooks_run,
                };
            }
            match registered.hook().mutate(obj, parent, collection, ctx) {
                Ok(out) => next.extend(out),
                Err(source) => {
                    return ChainOutcome::Failed {
                        error: PipelineError::Mutation {
                            identity: identity.clone(),
                            hook: registered.name().to_string(),
                            source,
                        },
                        hooks_run,
                    }
                }
            }
        }
        current = next;
        hooks_run += 1;
        if current.is_empty() {
            break;
        }
    }

    ChainOutcome::Done {
        objects: current,
        hooks_run,
    }
}

struct CandidateResult {
    outcome: CandidateOutcome,
    objects: Vec<DynamicObject>,
    error: Option<PipelineError>,
}

/// Runs registered hooks over the candidates of a reconciliation pass.
///
/// Hooks are synchronous. With more than one worker, candidates are split
/// into contiguous chunks processed on scoped threads and reassembled in
/// input order, so the output is identical to a sequential run.
pub struct MutationPipeline<P, C> {
    registry: Arc<MutationRegistry<P, C>>,
    workers: usize,
}

impl<P, C> Clone for MutationPipeline<P, C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            workers: self.workers,
        }
    }
}

impl<P, C> std::fmt::Debug for MutationPipeline<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationPipeline")
            .field("registry", &self.registry)
            .field("workers", &self.workers)
            .finish()
    }
}

impl<P, C> MutationPipeline<P, C> {
    /// Pipeline over `registry`, processing candidates sequentially
    pub fn new(registry: MutationRegistry<P, C>) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    /// Pipeline over a shared registry
    pub fn from_shared(registry: Arc<MutationRegistry<P, C>>) -> Self {
        Self {
            registry,
            workers: 1,
        }
    }

    /// Process candidates on up to `workers` threads (0 is treated as 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// The registry hooks are looked up in
    pub fn registry(&self) -> &MutationRegistry<P, C> {
        &self.registry
    }
}

impl<P: Sync, C: Sync> MutationPipeline<P, C> {
    /// Run the pipeline over `candidates`.
    ///
    /// Never fails as a whole: per-candidate errors are collected in the
    /// returned [`MutationOutput`] and it is up to the caller to decide
    /// whether a partial result is acceptable.
    #[instrument(
        skip_all,
        fields(
            candidates = candidates.len(),
            reconcile_id = ctx.map(MutationContext::reconcile_id).unwrap_or_default(),
        )
    )]
    pub fn run(
        &self,
        candidates: Vec<DynamicObject>,
        parent: &P,
        collection: &C,
        ctx: Option<&MutationContext>,
    ) -> MutationOutput {
        let start = Instant::now();

        let results = match usable(ctx) {
            None => {
                debug!("no usable reconciliation context, passing candidates through");
                candidates.into_iter().map(short_circuit).collect()
            }
            Some(ctx) if self.workers > 1 && candidates.len() > 1 => {
                self.process_parallel(candidates, parent, collection, ctx)
            }
            Some(ctx) => candidates
                .into_iter()
                .map(|c| self.process(c, parent, collection, ctx))
                .collect(),
        };

        let output = assemble(results);
        metrics::record_pipeline_duration(start.elapsed().as_secs_f64());

        debug!(
            objects = output.objects.len(),
            errors = output.errors.len(),
            mutated = output.count(CandidateState::Mutated),
            "mutation pipeline finished"
        );
        output
    }

    fn process(
        &self,
        candidate: DynamicObject,
        parent: &P,
        collection: &C,
        ctx: &MutationContext,
    ) -> CandidateResult {
        let identity = ObjectIdentity::of(&candidate);

        if ctx.is_cancelled() {
            return cancelled(identity);
        }

        let hooks = self.registry.lookup(&identity);
        if hooks.is_empty() {
            return CandidateResult {
                outcome: CandidateOutcome {
                    identity,
                    state: CandidateState::Unchanged,
                    hooks_run: 0,
                    produced: 1,
                },
                objects: vec![candidate],
                error: None,
            };
        }

        match run_chain(hooks, candidate, &identity, parent, collection, ctx) {
            ChainOutcome::Done { objects, hooks_run } => {
                debug!(
                    identity = %identity,
                    hooks = hooks_run,
                    produced = objects.len(),
                    "candidate mutated"
                );
                CandidateResult {
                    outcome: CandidateOutcome {
                        identity,
                        state: CandidateState::Mutated,
                        hooks_run,
                        produced: objects.len(),
                    },
                    objects,
                    error: None,
                }
            }
            ChainOutcome::Failed {
                error: err @ PipelineError::Cancelled { .. },
                hooks_run,
            } => CandidateResult {
                outcome: CandidateOutcome {
                    identity,
                    state: CandidateState::Cancelled,
                    hooks_run,
                    produced: 0,
                },
                objects: Vec::new(),
                error: Some(err),
            },
            ChainOutcome::Failed {
                error: err,
                hooks_run,
            } => {
                warn!(
                    identity = %identity,
                    hook = err.hook().unwrap_or_default(),
                    error = %err,
                    "mutation hook failed, dropping candidate"
                );
                CandidateResult {
                    outcome: CandidateOutcome {
                        identity,
                        state: CandidateState::Failed,
                        hooks_run,
                        produced: 0,
                    },
                    objects: Vec::new(),
                    error: Some(err),
                }
            }
        }
    }

    fn process_parallel(
        &self,
        candidates: Vec<DynamicObject>,
        parent: &P,
        collection: &C,
        ctx: &MutationContext,
    ) -> Vec<CandidateResult> {
        let workers = self.workers.min(candidates.len());
        let chunk_size = candidates.len().div_ceil(workers);

        let mut chunks: Vec<Vec<DynamicObject>> = Vec::with_capacity(workers);
        let mut rest = candidates.into_iter().peekable();
        while rest.peek().is_some() {
            chunks.push(rest.by_ref().take(chunk_size).collect());
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .into_iter()
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .into_iter()
                            .map(|c| self.process(c, parent, collection, ctx))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }
}

fn short_circuit(candidate: DynamicObject) -> CandidateResult {
    CandidateResult {
        outcome: CandidateOutcome {
            identity: ObjectIdentity::of(&candidate),
            state: CandidateState::ShortCircuited,
            hooks_run: 0,
            produced: 1,
        },
        objects: vec![candidate],
        error: None,
    }
}

fn cancelled(identity: ObjectIdentity) -> CandidateResult {
    CandidateResult {
        error: Some(PipelineError::Cancelled {
            identity: identity.clone(),
        }),
        outcome: CandidateOutcome {
            identity,
            state: CandidateState::Cancelled,
            hooks_run: 0,
            produced: 0,
        },
        objects: Vec::new(),
    }
}

fn assemble(results: Vec<CandidateResult>) -> MutationOutput {
    let mut output = MutationOutput::default();
    for result in results {
        metrics::record_mutation(&result.outcome.identity.kind, result.outcome.state.as_str());
        output.objects.extend(result.objects);
        output.errors.extend(result.error);
        output.outcomes.push(result.outcome);
    }
    output
}
