use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use mindmuse_core::{SpeechSynthesizer, StreamEvent, TurnObserver};

/// Speaks the final reply of every turn. Fallback replies are spoken too,
/// since they are what the user sees.
pub struct SpeechObserver {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    enabled: bool,
}

impl SpeechObserver {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, enabled: bool) -> Self {
        Self {
            synthesizer,
            enabled,
        }
    }
}

#[async_trait]
impl TurnObserver for SpeechObserver {
    async fn on_event(&self, conversation_id: &str, event: &StreamEvent) {
        if !self.enabled {
            return;
        }
        let text = match event {
            StreamEvent::Complete { text } => text,
            StreamEvent::Failed { fallback, .. } => fallback,
            StreamEvent::Update { .. } => return,
        };
        if let Err(e) = self.synthesizer.speak(text).await {
            warn!(conversation_id, error = %e, "speech synthesis failed");
        }
    }
}

/// Traces turn events. Fragment text is only logged at debug level.
#[derive(Debug, Default)]
pub struct LoggingObserver;

#[async_trait]
impl TurnObserver for LoggingObserver {
    async fn on_event(&self, conversation_id: &str, event: &StreamEvent) {
        match event {
            StreamEvent::Update { delta, accumulated } => {
                debug!(conversation_id, delta = %delta, so_far = accumulated.len(), "fragment");
            }
            StreamEvent::Complete { text } => {
                info!(conversation_id, chars = text.chars().count(), "turn complete");
            }
            StreamEvent::Failed { kind, .. } => {
                warn!(conversation_id, %kind, "turn failed; fallback reply used");
            }
        }
    }
}
