//! Message orchestrator
//!
//! One `process` call per dequeued message: persist it, build context,
//! resolve the intent (rules first, classifier second), run the handler,
//! reply, then let the engine re-evaluate the stage. Every failure path
//! ends in a generic fallback reply; a message is never silently dropped.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Result, eyre};
use tracing::{debug, info, warn};

use super::context::HandlerContext;
use super::handlers::{HandlerResult, Handlers};
use super::outbound::Responder;
use super::output::Output;
use crate::classifier::{Classifier, Intent, rules};
use crate::domain::{InboundMessage, StoredMessage, Trip};
use crate::fsm::TransitionRequester;
use crate::sequencer::MessageProcessor;
use crate::store::{Store, StoreError};

pub struct Orchestrator {
    store: Arc<dyn Store>,
    classifier: Arc<dyn Classifier>,
    handlers: Handlers,
    responder: Arc<dyn Responder>,
    engine: Arc<dyn TransitionRequester>,
    confidence_threshold: f64,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        classifier: Arc<dyn Classifier>,
        responder: Arc<dyn Responder>,
        engine: Arc<dyn TransitionRequester>,
        confidence_threshold: f64,
    ) -> Self {
        let handlers = Handlers::new(Arc::clone(&store), Arc::clone(&classifier));
        Self {
            store,
            classifier,
            handlers,
            responder,
            engine,
            confidence_threshold,
        }
    }

    /// Rules first, classifier second, conversational last.
    async fn resolve_intent(&self, ctx: &HandlerContext) -> Intent {
        let stage_ctx = ctx.stage_context();
        if let Some(intent) = rules::fast_intent(&stage_ctx, &ctx.message.body) {
            debug!(intent = %intent, "resolve_intent: rule fast path");
            return intent;
        }

        match self.classifier.classify_intent(&stage_ctx, &ctx.message.body).await {
            Ok(classification) if classification.confidence >= self.confidence_threshold => {
                debug!(
                    label = %classification.label,
                    confidence = classification.confidence,
                    "resolve_intent: classifier"
                );
                Intent::from_label(&classification.label)
            }
            Ok(classification) => {
                debug!(
                    label = %classification.label,
                    confidence = classification.confidence,
                    "resolve_intent: below confidence threshold"
                );
                Intent::Conversational
            }
            Err(e) => {
                // Retries happened inside the client; from here the rules
                // already declined, so conversational it is.
                warn!(error = %e, "resolve_intent: classifier failed");
                Intent::Conversational
            }
        }
    }

    async fn process_inner(&self, trip_id: &str, message: InboundMessage) -> Result<()> {
        let trip = self.store.get_trip(trip_id).await?;
        self.store
            .create_message(StoredMessage::from_inbound(trip_id, &message))
            .await?;

        let ctx = HandlerContext::build(self.store.as_ref(), trip, message).await?;
        let intent = self.resolve_intent(&ctx).await;

        let mut result = self.handlers.dispatch(intent, &ctx).await?;

        if let HandlerResult::Handoff(target) = result {
            if target == intent {
                return Err(eyre!("handler for {} handed off to itself", intent));
            }
            info!(from = %intent, to = %target, "process: handler handoff");
            // Context rebuilt, no re-classification, one hop only.
            let trip = self.store.get_trip(trip_id).await?;
            let ctx = HandlerContext::build(self.store.as_ref(), trip, ctx.message.clone()).await?;
            result = self.handlers.dispatch(target, &ctx).await?;
            if matches!(result, HandlerResult::Handoff(_)) {
                return Err(eyre!("repeated handoff from {} handler", target));
            }
        }

        let output = match result {
            HandlerResult::Success(output) => output,
            HandlerResult::Skip => Output::Conversational { stage: ctx.trip.stage },
            HandlerResult::Handoff(_) => unreachable!("second handoff rejected above"),
        };

        self.responder.reply(&ctx.trip.channel, &output.render()).await?;

        // New input may complete a stage; failures here are logged, the
        // scheduler sweep will retry the evaluation.
        if let Err(e) = self.engine.advance(trip_id).await {
            warn!(trip_id, error = %e, "process: stage advance failed");
        }

        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for Orchestrator {
    async fn process(&self, trip_id: &str, message: InboundMessage) -> Result<()> {
        debug!(trip_id, from = %message.from, "process: called");
        let channel = message.channel.clone();

        if let Err(e) = self.process_inner(trip_id, message).await {
            warn!(trip_id, error = %e, "process: failed, sending fallback reply");
            if let Err(send_err) = self.responder.reply(&channel, &Output::Fallback.render()).await {
                warn!(trip_id, error = %send_err, "process: fallback reply failed too");
            }
        }
        Ok(())
    }
}

/// Map an inbound message to its trip, creating one on first contact from
/// an unseen channel.
pub async fn resolve_trip(store: &dyn Store, message: &InboundMessage) -> Result<Trip, StoreError> {
    match store.get_trip_by_channel(&message.channel).await? {
        Some(trip) => Ok(trip),
        None => {
            info!(channel = %message.channel, "resolve_trip: new channel, creating trip");
            store.create_trip(Trip::new(&message.channel)).await
        }
    }
}
