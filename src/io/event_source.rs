//! Inbound event source abstraction
//!
//! The tracker pulls inputs one at a time and processes each to completion
//! before asking for the next, so a single source is consumed in order.

use crate::domain::input::TrackerInput;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Stream of tracker inputs; `None` means the source is exhausted
#[async_trait]
pub trait EventSource: Send {
    async fn next_input(&mut self) -> Option<TrackerInput>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<TrackerInput> {
    async fn next_input(&mut self) -> Option<TrackerInput> {
        self.recv().await
    }
}
