// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable event source.

use crate::event_source::EventSource;
use crate::provider::ProviderError;
use async_trait::async_trait;
use cw_core::Event;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Event source fed directly by tests; `poll` drains the queue in FIFO order.
#[derive(Clone, Default)]
pub struct QueueEventSource {
    queue: Arc<Mutex<VecDeque<Event>>>,
}

impl QueueEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.queue.lock().push_back(event);
    }
}

#[async_trait]
impl EventSource for QueueEventSource {
    async fn poll(
        &self,
        _owner: &str,
        _repo: &str,
        _since: i64,
    ) -> Result<Vec<Event>, ProviderError> {
        Ok(self.queue.lock().drain(..).collect())
    }
}
