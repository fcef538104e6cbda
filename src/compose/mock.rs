// SPDX-License-Identifier: AGPL-3.0-or-later
//! Test double that records invocations and replays preset outputs

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::runner::{CommandOutput, CommandRunner, Invocation};
use crate::error::Result;

/// Records every invocation; answers with queued outputs, then with success
#[derive(Default)]
pub struct RecordingRunner {
    responses: Mutex<VecDeque<CommandOutput>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outputs returned in order by subsequent runs
    pub fn with_responses(responses: Vec<CommandOutput>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Everything run so far
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Command lines run so far
    pub fn executed_commands(&self) -> Vec<String> {
        self.invocations().iter().map(Invocation::display).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        if let Ok(mut recorded) = self.invocations.lock() {
            recorded.push(invocation.clone());
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());

        Ok(next.unwrap_or_else(|| CommandOutput::ok("")))
    }
}
