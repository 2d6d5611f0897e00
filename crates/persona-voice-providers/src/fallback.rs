//! Provider fallback — walks voice providers in a fixed cyclic order.
//!
//! A [`FallbackSelector`] is created per user-triggered synthesis. It starts
//! at the requested provider (or the last one that worked, or the first
//! available one) and, on each failure, advances to the next position in
//! [`VoiceProvider::ALL`]. Unavailable providers are recorded as a step
//! without being called. After every position has been visited once the
//! selector is [`SelectorState::Exhausted`], so a chain never calls a provider
//! twice and ends within `VoiceProvider::ALL.len()` steps.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use persona_voice_core::voice::{ProviderAvailability, VoiceProvider};

use crate::dispatcher::VoiceDispatcher;
use crate::{AudioClip, SynthesisError, SynthesisRequest};

const PROVIDER_COUNT: usize = VoiceProvider::ALL.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Trying(VoiceProvider),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "cause", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Unavailable,
    Failed(String),
}

/// One visited position in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub provider: VoiceProvider,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Unavailable => write!(f, "{} unavailable", self.provider),
            AttemptOutcome::Failed(cause) => write!(f, "{} failed ({cause})", self.provider),
        }
    }
}

pub(crate) fn describe_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no providers tried".into();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub struct FallbackSelector {
    availability: ProviderAvailability,
    start: usize,
    visited: usize,
    state: SelectorState,
    attempts: Vec<Attempt>,
}

impl FallbackSelector {
    /// Start the chain at `requested`, else the last successful provider if it
    /// is still available, else the first available provider.
    pub fn new(
        availability: ProviderAvailability,
        requested: Option<VoiceProvider>,
        last_success: Option<VoiceProvider>,
    ) -> Self {
        let start = requested.unwrap_or_else(|| Self::initial_provider(availability, last_success));
        Self::starting_at(start, availability)
    }

    pub fn starting_at(start: VoiceProvider, availability: ProviderAvailability) -> Self {
        let mut selector = Self {
            availability,
            start: start.index(),
            visited: 0,
            state: SelectorState::Exhausted,
            attempts: Vec::with_capacity(PROVIDER_COUNT),
        };
        selector.settle();
        selector
    }

    /// Where a chain without an explicit request begins.
    pub fn initial_provider(
        availability: ProviderAvailability,
        last_success: Option<VoiceProvider>,
    ) -> VoiceProvider {
        last_success
            .filter(|p| availability.is_available(*p))
            .or_else(|| availability.first_available())
            .unwrap_or(VoiceProvider::ALL[0])
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn current(&self) -> Option<VoiceProvider> {
        match self.state {
            SelectorState::Trying(p) => Some(p),
            SelectorState::Exhausted => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == SelectorState::Exhausted
    }

    /// Number of positions visited so far, including skipped providers.
    pub fn steps(&self) -> usize {
        self.attempts.len()
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<Attempt> {
        self.attempts
    }

    /// Record that the current provider failed and advance.
    pub fn fail(&mut self, cause: impl Into<String>) -> SelectorState {
        self.record(AttemptOutcome::Failed(cause.into()))
    }

    /// Record an error from the current provider. `ProviderUnavailable` and
    /// upstream failures both advance the chain.
    pub fn record_error(&mut self, error: &SynthesisError) -> SelectorState {
        let outcome = match error {
            SynthesisError::ProviderUnavailable(_) => AttemptOutcome::Unavailable,
            SynthesisError::Failed { cause, .. } => AttemptOutcome::Failed(cause.clone()),
            other => AttemptOutcome::Failed(other.to_string()),
        };
        self.record(outcome)
    }

    fn record(&mut self, outcome: AttemptOutcome) -> SelectorState {
        if let SelectorState::Trying(provider) = self.state {
            self.attempts.push(Attempt { provider, outcome });
            self.visited += 1;
            self.settle();
        }
        self.state
    }

    /// Move to the next available unvisited position, skipping (and
    /// recording) unavailable providers.
    fn settle(&mut self) {
        while self.visited < PROVIDER_COUNT {
            let provider = VoiceProvider::ALL[(self.start + self.visited) % PROVIDER_COUNT];
            if self.availability.is_available(provider) {
                self.state = SelectorState::Trying(provider);
                return;
            }
            self.attempts.push(Attempt {
                provider,
                outcome: AttemptOutcome::Unavailable,
            });
            self.visited += 1;
        }
        self.state = SelectorState::Exhausted;
    }
}

/// A successful fallback chain.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub clip: AudioClip,
    /// Providers visited before the one that produced `clip`.
    pub attempts: Vec<Attempt>,
}

impl FallbackOutcome {
    pub fn hops(&self) -> usize {
        self.attempts.len()
    }
}

/// Synthesize with fallback across providers.
///
/// Validation errors end the chain immediately; every other failure advances
/// it. When the chain is exhausted the error carries the full attempt log.
pub async fn synthesize_with_fallback(
    dispatcher: &VoiceDispatcher,
    text: &str,
    character_id: &str,
    requested: Option<VoiceProvider>,
    last_success: Option<VoiceProvider>,
) -> Result<FallbackOutcome, SynthesisError> {
    dispatcher.validate(text, character_id)?;

    let mut selector = FallbackSelector::new(dispatcher.availability(), requested, last_success);

    while let SelectorState::Trying(provider) = selector.state() {
        let request = SynthesisRequest {
            text: text.to_string(),
            character_id: character_id.to_string(),
            provider,
        };
        match dispatcher.synthesize(&request).await {
            Ok(clip) => {
                if selector.steps() > 0 {
                    info!(
                        %provider,
                        hops = selector.steps(),
                        "Fallback succeeded"
                    );
                }
                return Ok(FallbackOutcome {
                    clip,
                    attempts: selector.into_attempts(),
                });
            }
            Err(e) if e.is_retryable_elsewhere() => {
                warn!(%provider, %e, "Voice provider failed, trying next");
                selector.record_error(&e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(SynthesisError::Exhausted {
        attempts: selector.into_attempts(),
    })
}
