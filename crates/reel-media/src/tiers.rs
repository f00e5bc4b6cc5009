//! Ordered render strategies.
//!
//! A [`TierChain`] tries each [`RenderTier`] in turn against the same job and
//! stops at the first success. Failures are collected rather than nested so
//! callers can report every attempt.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::command::ProcessRunner;
use crate::error::MediaError;
use crate::error::MediaResult;

/// One strategy for producing an artifact from a job of type `J`.
#[async_trait]
pub trait RenderTier<J: Sync>: Send + Sync {
    /// Short name used in logs, events and reports.
    fn name(&self) -> &'static str;

    /// Local files this tier may create, registered for cleanup before
    /// rendering starts.
    fn scratch_files(&self, job: &J) -> Vec<PathBuf>;

    /// Render the job, returning the output path.
    async fn render(&self, runner: &dyn ProcessRunner, job: &J) -> MediaResult<PathBuf>;
}

/// A tier that did not produce output.
#[derive(Debug)]
pub struct TierFailure {
    pub tier: &'static str,
    pub error: MediaError,
}

/// Result of running a chain.
#[derive(Debug)]
pub enum TierOutcome {
    Rendered {
        tier: &'static str,
        output: PathBuf,
        failures: Vec<TierFailure>,
    },
    Exhausted {
        failures: Vec<TierFailure>,
    },
}

impl TierOutcome {
    pub fn output(&self) -> Option<&PathBuf> {
        match self {
            TierOutcome::Rendered { output, .. } => Some(output),
            TierOutcome::Exhausted { .. } => None,
        }
    }

    pub fn tier(&self) -> Option<&'static str> {
        match self {
            TierOutcome::Rendered { tier, .. } => Some(tier),
            TierOutcome::Exhausted { .. } => None,
        }
    }

    pub fn failures(&self) -> &[TierFailure] {
        match self {
            TierOutcome::Rendered { failures, .. } | TierOutcome::Exhausted { failures } => failures,
        }
    }
}

/// Tiers tried in order of decreasing sophistication.
pub struct TierChain<J> {
    label: &'static str,
    tiers: Vec<Box<dyn RenderTier<J>>>,
}

impl<J: Sync> TierChain<J> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            tiers: Vec::new(),
        }
    }

    pub fn with_tier(mut self, tier: impl RenderTier<J> + 'static) -> Self {
        self.tiers.push(Box::new(tier));
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Scratch files of every tier, for cleanup registration.
    pub fn scratch_files(&self, job: &J) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::new();
        for tier in &self.tiers {
            for file in tier.scratch_files(job) {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }
        files
    }

    /// Run tiers in order until one succeeds.
    pub async fn run(&self, runner: &dyn ProcessRunner, job: &J) -> TierOutcome {
        let mut failures = Vec::new();

        for tier in &self.tiers {
            match tier.render(runner, job).await {
                Ok(output) => {
                    info!(chain = self.label, tier = tier.name(), "Render tier succeeded");
                    return TierOutcome::Rendered {
                        tier: tier.name(),
                        output,
                        failures,
                    };
                }
                Err(error) => {
                    warn!(
                        chain = self.label,
                        tier = tier.name(),
                        stderr = error.stderr_tail(5).unwrap_or_default(),
                        "Render tier failed: {}",
                        error
                    );
                    failures.push(TierFailure {
                        tier: tier.name(),
                        error,
                    });
                }
            }
        }

        warn!(chain = self.label, attempts = failures.len(), "All render tiers failed");
        TierOutcome::Exhausted { failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoopRunner;

    #[async_trait]
    impl ProcessRunner for NoopRunner {
        async fn run(&self, _program: &str, _args: &[String]) -> MediaResult<ProcessOutput> {
            Ok(ProcessOutput::default())
        }
    }

    struct Scripted {
        name: &'static str,
        succeed: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RenderTier<String> for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn scratch_files(&self, job: &String) -> Vec<PathBuf> {
            vec![PathBuf::from(format!("{}.mp4", job)), PathBuf::from(format!("{}.txt", self.name))]
        }

        async fn render(&self, _runner: &dyn ProcessRunner, job: &String) -> MediaResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(PathBuf::from(format!("{}.mp4", job)))
            } else {
                Err(MediaError::ffmpeg_failed(self.name, Some("bad graph".into()), Some(1)))
            }
        }
    }

    fn tier(name: &'static str, succeed: bool, calls: &Arc<AtomicUsize>) -> Scripted {
        Scripted {
            name,
            succeed,
            calls: calls.clone(),
        }
    }

    #[tokio::test]
    async fn test_falls_through_to_next_tier() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = TierChain::new("slideshow")
            .with_tier(tier("enhanced", false, &calls))
            .with_tier(tier("basic", true, &calls))
            .with_tier(tier("never", true, &calls));

        let outcome = chain.run(&NoopRunner, &"out".to_string()).await;
        assert_eq!(outcome.tier(), Some("basic"));
        assert_eq!(outcome.output(), Some(&PathBuf::from("out.mp4")));
        assert_eq!(outcome.failures().len(), 1);
        assert_eq!(outcome.failures()[0].tier, "enhanced");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_collects_every_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = TierChain::new("merge")
            .with_tier(tier("primary", false, &calls))
            .with_tier(tier("raw_stack", false, &calls));

        let outcome = chain.run(&NoopRunner, &"out".to_string()).await;
        assert!(matches!(outcome, TierOutcome::Exhausted { .. }));
        let names: Vec<_> = outcome.failures().iter().map(|f| f.tier).collect();
        assert_eq!(names, vec!["primary", "raw_stack"]);
    }

    #[test]
    fn test_scratch_files_deduplicated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = TierChain::new("slideshow")
            .with_tier(tier("a", true, &calls))
            .with_tier(tier("b", true, &calls));
        let files = chain.scratch_files(&"out".to_string());
        assert_eq!(files.len(), 3);
        assert_eq!(chain.tier_names(), vec!["a", "b"]);
    }
}
