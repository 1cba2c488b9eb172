//! Periodic audio alerts.
//!
//! Each tick records a short WAV clip, classifies it with the hosted
//! classifier (falling back to the local one) and raises an alert when a
//! watched label clears the threshold. Only alerts reach the event store.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigil_db::EventStore;
use vigil_models::{FailureCode, LabelScore, NewEvent};

use crate::collaborators::{AudioSource, LabelClassifier};
use crate::error::PerceptionError;
use crate::metrics;
use crate::worker::{Perception, StopSignal, TickOutcome};

const WAV_CONTENT_TYPE: &str = "audio/wav";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AudioTick {
    /// Highest-scoring watched label above the threshold
    pub alert: Option<LabelScore>,
    pub results: Vec<LabelScore>,
}

pub struct AudioPerception {
    source: Arc<dyn AudioSource>,
    remote: Option<Arc<dyn LabelClassifier>>,
    local: Option<Arc<dyn LabelClassifier>>,
    store: Arc<EventStore>,
    labels: Vec<String>,
    threshold: f32,
    window: Duration,
    interval: Duration,
}

impl AudioPerception {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn AudioSource>,
        remote: Option<Arc<dyn LabelClassifier>>,
        local: Option<Arc<dyn LabelClassifier>>,
        store: Arc<EventStore>,
        labels: Vec<String>,
        threshold: f32,
        window: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            remote,
            local,
            store,
            labels: labels.into_iter().map(|l| l.to_lowercase()).collect(),
            threshold,
            window,
            interval,
        }
    }

    /// Remote first; an error or empty answer falls through to the local classifier.
    fn classify(&self, wav: &[u8]) -> Vec<LabelScore> {
        for (kind, classifier) in [("remote", &self.remote), ("local", &self.local)] {
            let Some(classifier) = classifier else {
                continue;
            };
            match classifier.classify(wav, WAV_CONTENT_TYPE) {
                Ok(results) if !results.is_empty() => return results,
                Ok(_) => debug!(classifier = kind, "Audio classifier returned no labels"),
                Err(e) => debug!(classifier = kind, "Audio classification failed: {}", e),
            }
        }
        Vec::new()
    }

    /// Highest-scoring label on the watch-list with score at or above the threshold.
    pub fn pick_alert(&self, results: &[LabelScore]) -> Option<LabelScore> {
        results
            .iter()
            .map(|r| LabelScore::new(r.label.to_lowercase(), r.score))
            .filter(|r| r.score >= self.threshold && self.labels.contains(&r.label))
            .fold(None, |best: Option<LabelScore>, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            })
    }
}

impl Perception for AudioPerception {
    type Output = AudioTick;

    fn name(&self) -> &'static str {
        "audio"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn gate(&self) -> bool {
        self.remote.is_some() || self.local.is_some()
    }

    fn tick(&mut self, _stop: &StopSignal) -> TickOutcome<AudioTick> {
        let wav = match self.source.record(self.window) {
            Ok(Some(wav)) if !wav.is_empty() => wav,
            Ok(_) => return TickOutcome::abandoned("no audio recorded"),
            Err(e) => return TickOutcome::abandoned(e.to_string()),
        };

        let results = self.classify(&wav);
        if results.is_empty() {
            return TickOutcome::failed(FailureCode::NoResults, "no audio classifier produced labels");
        }

        let alert = self.pick_alert(&results);
        if let Some(alert) = &alert {
            let event = NewEvent::audio_alert(alert.label.clone(), alert.score);
            match self.store.append_event(&event) {
                Ok(stored) => {
                    metrics::record_event(stored.event_type.as_str());
                    info!(label = %alert.label, score = alert.score, "Audio alert");
                }
                Err(e) => {
                    let e = PerceptionError::from(e);
                    return TickOutcome::failed(e.failure_code(), e.to_string());
                }
            }
        }

        TickOutcome::ok(AudioTick { alert, results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PerceptionResult;
    use vigil_models::EventType;

    struct Mic(Option<Vec<u8>>);

    impl AudioSource for Mic {
        fn record(&self, _duration: Duration) -> PerceptionResult<Option<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    struct Fixed(PerceptionResult<Vec<LabelScore>>);

    impl LabelClassifier for Fixed {
        fn classify(&self, _data: &[u8], content_type: &str) -> PerceptionResult<Vec<LabelScore>> {
            assert_eq!(content_type, "audio/wav");
            match &self.0 {
                Ok(labels) => Ok(labels.clone()),
                Err(_) => Err(PerceptionError::inference_failed("endpoint down")),
            }
        }
    }

    fn classifier(result: PerceptionResult<Vec<LabelScore>>) -> Option<Arc<dyn LabelClassifier>> {
        Some(Arc::new(Fixed(result)))
    }

    fn perception(
        remote: Option<Arc<dyn LabelClassifier>>,
        local: Option<Arc<dyn LabelClassifier>>,
        store: Arc<EventStore>,
    ) -> AudioPerception {
        AudioPerception::new(
            Arc::new(Mic(Some(vec![1, 2, 3]))),
            remote,
            local,
            store,
            vec!["Scream".to_string(), "glass breaking".to_string()],
            0.6,
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
    }

    fn publish(outcome: TickOutcome<AudioTick>) -> vigil_models::TickResult<AudioTick> {
        match outcome {
            TickOutcome::Publish(result) => result,
            TickOutcome::Abandoned(reason) => panic!("abandoned: {reason}"),
        }
    }

    #[test]
    fn test_gate_needs_a_classifier() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        assert!(!perception(None, None, Arc::clone(&store)).gate());
        assert!(perception(None, classifier(Ok(Vec::new())), store).gate());
    }

    #[test]
    fn test_alert_is_recorded() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let mut audio = perception(
            classifier(Ok(vec![
                LabelScore::new("Speech", 0.95),
                LabelScore::new("SCREAM", 0.7),
                LabelScore::new("glass breaking", 0.65),
            ])),
            None,
            Arc::clone(&store),
        );

        let tick = publish(audio.tick(&StopSignal::new()));
        let tick = tick.outcome.result().unwrap();
        assert_eq!(tick.alert, Some(LabelScore::new("scream", 0.7)));
        assert_eq!(tick.results.len(), 3);

        let events = store.recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::AudioAlert);
        assert_eq!(events[0].name.as_deref(), Some("scream"));
        assert!(events[0].bbox.is_none());
    }

    #[test]
    fn test_below_threshold_is_not_an_alert() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let mut audio = perception(
            classifier(Ok(vec![LabelScore::new("scream", 0.59)])),
            None,
            Arc::clone(&store),
        );
        let tick = publish(audio.tick(&StopSignal::new()));
        assert_eq!(tick.outcome.result().unwrap().alert, None);
        assert!(store.recent_events(10).unwrap().is_empty());
    }

    #[test]
    fn test_remote_failure_falls_back_to_local() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let mut audio = perception(
            classifier(Err(PerceptionError::inference_failed("down"))),
            classifier(Ok(vec![LabelScore::new("scream", 0.8)])),
            store,
        );
        let tick = publish(audio.tick(&StopSignal::new()));
        assert_eq!(
            tick.outcome.result().unwrap().alert.as_ref().map(|a| a.label.as_str()),
            Some("scream")
        );
    }

    #[test]
    fn test_no_labels_is_no_results() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let mut audio = perception(classifier(Ok(Vec::new())), None, store);
        let tick = publish(audio.tick(&StopSignal::new()));
        assert_eq!(tick.outcome.failure_code(), Some(FailureCode::NoResults));
    }

    #[test]
    fn test_missing_recording_is_abandoned() {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let mut audio = AudioPerception::new(
            Arc::new(Mic(None)),
            classifier(Ok(vec![LabelScore::new("scream", 0.9)])),
            None,
            Arc::clone(&store),
            vec!["scream".to_string()],
            0.6,
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        assert!(matches!(
            audio.tick(&StopSignal::new()),
            TickOutcome::Abandoned(_)
        ));
        assert!(store.recent_events(10).unwrap().is_empty());
    }
}
