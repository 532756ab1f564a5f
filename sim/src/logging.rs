//! Logging and the in-game info channel.
//!
//! Diagnostics go through `tracing`. Front-ends that want the human-readable battle
//! feed (kills, promotions, victory) drain the `InfoChannel` resource instead.

use bevy_ecs::prelude::*;
use std::collections::VecDeque;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a console subscriber. `RUST_LOG` wins over `default_filter` when set.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Bounded buffer of battle messages.
#[derive(Resource, Debug, Clone)]
pub struct InfoChannel {
    messages: VecDeque<String>,
    capacity: usize,
}

impl Default for InfoChannel {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl InfoChannel {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, dropping the oldest once full.
    pub fn post(&mut self, message: impl Into<String>) {
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message.into());
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_drops_oldest() {
        let mut channel = InfoChannel::with_capacity(2);
        channel.post("a");
        channel.post("b");
        channel.post("c");
        assert_eq!(channel.drain(), vec!["b".to_string(), "c".to_string()]);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("warn");
        init_logging("debug");
    }
}
