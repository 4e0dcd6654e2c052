//! Admission gate: validates a candidate before it may enter the download queue.

use std::sync::Arc;

use marquee_config::BotSettings;
use marquee_core::{
    ActiveDownload, AdmissionError, AdmissionResult, CandidateResult, ChatId, TransferDescriptor,
};
use marquee_telemetry::Metrics;
use tracing::info;

use crate::lifecycle::LifecycleController;

/// Thresholds a candidate must meet.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionPolicy {
    /// Largest payload admitted, in KiB.
    pub max_download_size_kb: u64,
    /// Minimum seed to leech ratio.
    pub min_ratio: f64,
    /// Minimum seed count.
    pub min_seeds: u32,
}

impl From<&BotSettings> for AdmissionPolicy {
    fn from(settings: &BotSettings) -> Self {
        Self {
            max_download_size_kb: settings.max_download_size_kb,
            min_ratio: settings.min_ratio,
            min_seeds: settings.min_seeds,
        }
    }
}

impl AdmissionPolicy {
    /// Run the checks in their fixed order: descriptor, capacity, size, swarm health.
    ///
    /// # Errors
    ///
    /// Returns the first check the candidate fails.
    pub fn evaluate<'a>(
        &self,
        candidate: &'a CandidateResult,
        queue_full: bool,
        capacity: usize,
    ) -> AdmissionResult<&'a TransferDescriptor> {
        let descriptor = candidate
            .descriptor
            .as_ref()
            .filter(|descriptor| !descriptor.is_blank())
            .ok_or(AdmissionError::InvalidDescriptor)?;
        if queue_full {
            return Err(AdmissionError::QueueFull { capacity });
        }
        if candidate.size_kb > self.max_download_size_kb {
            return Err(AdmissionError::TooLarge {
                size_kb: candidate.size_kb,
                max_kb: self.max_download_size_kb,
            });
        }
        if candidate.seed_ratio() < self.min_ratio || candidate.seeds < self.min_seeds {
            return Err(AdmissionError::LowQuality {
                seeds: candidate.seeds,
                leeches: candidate.leeches,
            });
        }
        Ok(descriptor)
    }
}

/// Validates candidates and forwards passing ones to the lifecycle controller.
pub struct AdmissionGate {
    policy: AdmissionPolicy,
    lifecycle: Arc<LifecycleController>,
    metrics: Metrics,
}

impl AdmissionGate {
    /// Gate in front of `lifecycle`.
    #[must_use]
    pub const fn new(
        policy: AdmissionPolicy,
        lifecycle: Arc<LifecycleController>,
        metrics: Metrics,
    ) -> Self {
        Self {
            policy,
            lifecycle,
            metrics,
        }
    }

    /// Admit `candidate` on behalf of `origin`.
    ///
    /// # Errors
    ///
    /// Returns the failed check, or the controller's `QueueFull`/`AlreadyQueued`/`Engine`
    /// error when the queue changed underneath or the engine refused the descriptor.
    pub async fn admit(
        &self,
        candidate: &CandidateResult,
        origin: ChatId,
    ) -> AdmissionResult<ActiveDownload> {
        let queue_full = self.lifecycle.is_full().await;
        let result = match self
            .policy
            .evaluate(candidate, queue_full, self.lifecycle.capacity())
        {
            Ok(descriptor) => self.lifecycle.enqueue(descriptor, origin).await,
            Err(err) => Err(err),
        };
        match &result {
            Ok(download) => {
                self.metrics.inc_admission("admitted");
                info!(
                    candidate = %candidate.id,
                    transfer_id = %download.transfer_id,
                    "candidate admitted"
                );
            }
            Err(err) => {
                self.metrics.inc_admission(err.outcome());
                info!(candidate = %candidate.id, outcome = err.outcome(), "candidate refused");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_test_support::fixtures;

    fn policy() -> AdmissionPolicy {
        AdmissionPolicy {
            max_download_size_kb: 2_048_000,
            min_ratio: 5.0,
            min_seeds: 10,
        }
    }

    #[test]
    fn missing_descriptor_is_invalid_first() {
        let mut candidate = fixtures::candidate("x");
        candidate.descriptor = None;
        assert!(matches!(
            policy().evaluate(&candidate, true, 3),
            Err(AdmissionError::InvalidDescriptor)
        ));
        candidate.descriptor = Some(TransferDescriptor::new("  "));
        assert!(matches!(
            policy().evaluate(&candidate, false, 3),
            Err(AdmissionError::InvalidDescriptor)
        ));
    }

    #[test]
    fn full_queue_wins_over_size_and_quality() {
        let candidate = fixtures::candidate_with("huge", 1, 100, 9_000_000);
        assert!(matches!(
            policy().evaluate(&candidate, true, 3),
            Err(AdmissionError::QueueFull { capacity: 3 })
        ));
    }

    #[test]
    fn oversize_is_rejected_before_quality() {
        let candidate = fixtures::candidate_with("big", 1, 100, 5_000_000);
        assert!(matches!(
            policy().evaluate(&candidate, false, 3),
            Err(AdmissionError::TooLarge {
                size_kb: 5_000_000,
                max_kb: 2_048_000
            })
        ));
    }

    #[test]
    fn ratio_and_seed_floor_both_apply() {
        let poor_ratio = fixtures::candidate_with("ratio", 40, 10, 1_000);
        assert!(matches!(
            policy().evaluate(&poor_ratio, false, 3),
            Err(AdmissionError::LowQuality { .. })
        ));
        let few_seeds = fixtures::candidate_with("seeds", 9, 0, 1_000);
        assert!(matches!(
            policy().evaluate(&few_seeds, false, 3),
            Err(AdmissionError::LowQuality { .. })
        ));
        let no_leeches = fixtures::candidate_with("fine", 10, 0, 1_000);
        assert!(policy().evaluate(&no_leeches, false, 3).is_ok());
        let exact_ratio = fixtures::candidate_with("edge", 50, 10, 2_048_000);
        assert!(policy().evaluate(&exact_ratio, false, 3).is_ok());
    }
}
