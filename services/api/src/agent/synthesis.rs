//! Runtime degradation for a separate synthesis stage.
//!
//! A failed synthesis skips that utterance; the session only ends once
//! failures repeat `threshold` times in a row.

use crate::provider::SpeechSynthesizer;
use bytes::Bytes;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Spoken(Bytes),
    /// Nothing was spoken for this utterance; the session continues.
    Skipped,
    /// Consecutive failures reached the threshold.
    Exhausted { failures: u32 },
}

#[derive(Debug)]
pub struct SynthesisGuard {
    threshold: u32,
    consecutive_failures: u32,
}

impl SynthesisGuard {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub async fn speak(
        &mut self,
        synthesizer: &dyn SpeechSynthesizer,
        text: &str,
        language: &str,
    ) -> SynthesisOutcome {
        if text.trim().is_empty() {
            return SynthesisOutcome::Skipped;
        }
        match synthesizer.synthesize(text, language).await {
            Ok(audio) => {
                self.consecutive_failures = 0;
                SynthesisOutcome::Spoken(audio)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.threshold {
                    error!(
                        error = %e,
                        failures = self.consecutive_failures,
                        "Speech synthesis keeps failing"
                    );
                    SynthesisOutcome::Exhausted {
                        failures: self.consecutive_failures,
                    }
                } else {
                    warn!(
                        error = %e,
                        failures = self.consecutive_failures,
                        "Speech synthesis failed; skipping utterance"
                    );
                    SynthesisOutcome::Skipped
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the calls whose (1-based) index is listed.
    struct Flaky {
        calls: AtomicU32,
        failing: Vec<u32>,
    }

    #[async_trait]
    impl SpeechSynthesizer for Flaky {
        async fn synthesize(&self, _text: &str, _language: &str) -> Result<Bytes> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.contains(&call) {
                Err(anyhow!("503 from synthesis provider"))
            } else {
                Ok(Bytes::from_static(&[0, 0]))
            }
        }
    }

    #[tokio::test]
    async fn test_failures_below_threshold_are_skipped() {
        let synth = Flaky {
            calls: AtomicU32::new(0),
            failing: vec![1, 2, 4],
        };
        let mut guard = SynthesisGuard::new(3);

        assert_eq!(guard.speak(&synth, "een", "nl-NL").await, SynthesisOutcome::Skipped);
        assert_eq!(guard.speak(&synth, "twee", "nl-NL").await, SynthesisOutcome::Skipped);
        assert!(matches!(
            guard.speak(&synth, "drie", "nl-NL").await,
            SynthesisOutcome::Spoken(_)
        ));
        assert_eq!(guard.consecutive_failures(), 0);
        assert_eq!(guard.speak(&synth, "vier", "nl-NL").await, SynthesisOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_repeated_failures_exhaust_the_guard() {
        let synth = Flaky {
            calls: AtomicU32::new(0),
            failing: vec![1, 2, 3],
        };
        let mut guard = SynthesisGuard::new(3);

        guard.speak(&synth, "een", "nl-NL").await;
        guard.speak(&synth, "twee", "nl-NL").await;
        assert_eq!(
            guard.speak(&synth, "drie", "nl-NL").await,
            SynthesisOutcome::Exhausted { failures: 3 }
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_not_sent() {
        let synth = Flaky {
            calls: AtomicU32::new(0),
            failing: vec![1],
        };
        let mut guard = SynthesisGuard::new(1);
        assert_eq!(guard.speak(&synth, "  ", "nl-NL").await, SynthesisOutcome::Skipped);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }
}
