//! Outbound message seams
//!
//! Two capabilities point at the channel boundary: [`Responder`] replies in
//! the context of a message being processed, [`Notifier`] announces
//! proactively (stage entries, nudges). Production wiring points both at
//! the same transport; tests record instead of sending.

use async_trait::async_trait;
use tracing::info;

/// Sends a reply triggered by an inbound message
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, channel: &str, text: &str) -> eyre::Result<()>;
}

/// Sends a proactive announcement into a channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, text: &str) -> eyre::Result<()>;
}

/// Transport that writes outbound messages to the log.
///
/// Stands in for a real channel integration; everything upstream only sees
/// the traits.
pub struct LogOutbound;

#[async_trait]
impl Responder for LogOutbound {
    async fn reply(&self, channel: &str, text: &str) -> eyre::Result<()> {
        info!(channel, text, "outbound reply");
        Ok(())
    }
}

#[async_trait]
impl Notifier for LogOutbound {
    async fn notify(&self, channel: &str, text: &str) -> eyre::Result<()> {
        info!(channel, text, "outbound notification");
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Records outbound messages for assertions
    #[derive(Default)]
    pub struct MockOutbound {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockOutbound {
        pub fn new() -> Self {
            Self::default()
        }

        /// All (channel, text) pairs sent so far
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        /// Texts sent to one channel
        pub fn texts_for(&self, channel: &str) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == channel)
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Responder for MockOutbound {
        async fn reply(&self, channel: &str, text: &str) -> eyre::Result<()> {
            self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for MockOutbound {
        async fn notify(&self, channel: &str, text: &str) -> eyre::Result<()> {
            self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }
}
