//! Shared test doubles for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use hearth_core::{Error, FanoutChannel, FanoutMessage, Result};

/// Fan-out channel that records every published message.
#[derive(Default)]
pub struct RecordingFanout {
    messages: Mutex<Vec<FanoutMessage>>,
    failing_channels: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl RecordingFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject publishes to one channel.
    pub fn fail_channel(&self, channel: &str) {
        self.failing_channels.lock().unwrap().insert(channel.to_string());
    }

    /// Reject every publish.
    pub fn fail_all(&self) {
        *self.fail_all.lock().unwrap() = true;
    }

    pub fn messages(&self) -> Vec<FanoutMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.messages().into_iter().map(|m| m.channel).collect();
        channels.sort();
        channels
    }
}

#[async_trait]
impl FanoutChannel for RecordingFanout {
    async fn publish(&self, message: &FanoutMessage) -> Result<()> {
        if *self.fail_all.lock().unwrap()
            || self.failing_channels.lock().unwrap().contains(&message.channel)
        {
            return Err(Error::Fanout(format!("{} unreachable", message.channel)));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}
