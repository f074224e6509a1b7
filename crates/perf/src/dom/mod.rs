//! Frame-batched DOM updates.
//!
//! Mutations are queued and applied together once per frame, so a burst of
//! metric updates costs a single layout pass. Updates aimed at elements that
//! do not exist are dropped silently.

mod document;

pub use document::{Document, Element, VirtualDocument, VirtualElement};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::DomConfig;
use crate::frame::{next_frame, FrameTimer};

/// Content of a queued DOM update. Each kind replaces one aspect of the element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum DomContent {
    /// Replace the text content.
    Text(String),
    /// Replace the inner markup.
    Html(String),
    /// Replace the class attribute.
    Class(String),
    /// Merge inline style properties.
    Style(BTreeMap<String, String>),
}

impl DomContent {
    fn apply(&self, element: &mut dyn Element) {
        match self {
            Self::Text(text) => element.set_text_content(text),
            Self::Html(html) => element.set_inner_html(html),
            Self::Class(class_name) => element.set_class_name(class_name),
            Self::Style(properties) => element.merge_style(properties),
        }
    }
}

enum DomCommand {
    Update {
        target_id: String,
        content: DomContent,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
}

/// Handle to the DOM batching task.
#[derive(Clone)]
pub struct DomUpdateBatcher {
    tx: mpsc::UnboundedSender<DomCommand>,
}

impl DomUpdateBatcher {
    /// Spawn the batching task, which takes ownership of `document`.
    pub fn spawn<D: Document>(document: D, config: DomConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = DomBatchLoop {
            document,
            frame: FrameTimer::new(config.frame_interval),
            pending: Vec::new(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    pub fn queue_update(&self, target_id: impl Into<String>, content: DomContent) {
        let command = DomCommand::Update {
            target_id: target_id.into(),
            content,
        };
        if self.tx.send(command).is_err() {
            debug!("DOM batcher task is gone, dropping update");
        }
    }

    /// Queue a text content replacement.
    pub fn queue_text(&self, target_id: impl Into<String>, text: impl Into<String>) {
        self.queue_update(target_id, DomContent::Text(text.into()));
    }

    /// Apply pending updates now instead of waiting for the frame.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(DomCommand::Flush { done }).is_ok() {
            let _ = rx.await;
        }
    }
}

struct DomBatchLoop<D> {
    document: D,
    frame: FrameTimer,
    pending: Vec<(String, DomContent)>,
}

impl<D: Document> DomBatchLoop<D> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DomCommand>) {
        loop {
            let deadline = self.frame.deadline();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(DomCommand::Update { target_id, content }) => {
                        self.pending.push((target_id, content));
                        self.frame.arm();
                    }
                    Some(DomCommand::Flush { done }) => {
                        self.flush();
                        let _ = done.send(());
                    }
                    None => break,
                },
                _ = next_frame(deadline) => self.flush(),
            }
        }
        self.flush();
        debug!("DOM batcher stopped");
    }

    fn flush(&mut self) {
        self.frame.disarm();
        let updates = std::mem::take(&mut self.pending);
        if updates.is_empty() {
            return;
        }

        let count = updates.len();
        let mut skipped = 0;
        for (target_id, content) in updates {
            let found = self
                .document
                .with_element(&target_id, &mut |element| content.apply(element));
            if !found {
                skipped += 1;
            }
        }

        debug!(updates = count, skipped, "Flushed DOM updates");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    const PAST_FRAME: Duration = Duration::from_millis(50);

    /// Document that counts flush passes by counting lookups per frame.
    #[derive(Clone, Default)]
    struct CountingDocument {
        inner: VirtualDocument,
        lookups: std::sync::Arc<std::sync::Mutex<Vec<tokio::time::Instant>>>,
    }

    impl Document for CountingDocument {
        fn with_element(
            &mut self,
            id: &str,
            apply: &mut dyn FnMut(&mut dyn Element),
        ) -> bool {
            self.lookups
                .lock()
                .unwrap()
                .push(tokio::time::Instant::now());
            self.inner.with_element(id, apply)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_kind_is_applied() {
        let document = VirtualDocument::with_ids(["bitrate", "log", "status", "bar"]);
        let batcher = DomUpdateBatcher::spawn(document.clone(), DomConfig::default());

        batcher.queue_text("bitrate", "2.5 Mbps");
        batcher.queue_update("log", DomContent::Html("<li>segment 42</li>".to_string()));
        batcher.queue_update("status", DomContent::Class("badge live".to_string()));
        batcher.queue_update(
            "bar",
            DomContent::Style(BTreeMap::from([("width".to_string(), "75%".to_string())])),
        );
        sleep(PAST_FRAME).await;

        assert_eq!(document.element("bitrate").unwrap().text_content, "2.5 Mbps");
        assert_eq!(
            document.element("log").unwrap().inner_html,
            "<li>segment 42</li>"
        );
        assert_eq!(document.element("status").unwrap().class_name, "badge live");
        assert_eq!(document.element("bar").unwrap().style["width"], "75%");
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_wait_for_frame() {
        let document = VirtualDocument::with_ids(["bitrate"]);
        let batcher = DomUpdateBatcher::spawn(
            document.clone(),
            DomConfig {
                frame_interval: Duration::from_millis(100),
            },
        );

        batcher.queue_text("bitrate", "1.0 Mbps");
        sleep(Duration::from_millis(50)).await;
        assert_eq!(document.element("bitrate").unwrap().text_content, "");

        sleep(Duration::from_millis(60)).await;
        assert_eq!(document.element("bitrate").unwrap().text_content, "1.0 Mbps");
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_frame_updates_apply_in_one_pass() {
        let document = CountingDocument {
            inner: VirtualDocument::with_ids(["bitrate"]),
            ..CountingDocument::default()
        };
        let batcher = DomUpdateBatcher::spawn(document.clone(), DomConfig::default());

        batcher.queue_text("bitrate", "1.0 Mbps");
        batcher.queue_text("bitrate", "2.0 Mbps");
        sleep(PAST_FRAME).await;

        let lookups = document.lookups.lock().unwrap().clone();
        assert_eq!(lookups.len(), 2);
        assert_eq!(lookups[0], lookups[1]);
        // Last write wins within a frame
        assert_eq!(
            document.inner.element("bitrate").unwrap().text_content,
            "2.0 Mbps"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_is_skipped() {
        let document = VirtualDocument::with_ids(["bitrate"]);
        let batcher = DomUpdateBatcher::spawn(document.clone(), DomConfig::default());

        batcher.queue_text("removed-panel", "ignored");
        batcher.queue_text("bitrate", "3.0 Mbps");
        batcher.flush().await;

        assert_eq!(document.element("bitrate").unwrap().text_content, "3.0 Mbps");
        assert!(document.element("removed-panel").is_none());
    }

    #[test]
    fn test_content_serde_shape() {
        let content = DomContent::Class("badge".to_string());
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json, serde_json::json!({"type": "class", "content": "badge"}));

        let parsed: DomContent =
            serde_json::from_value(serde_json::json!({"type": "text", "content": "hi"})).unwrap();
        assert_eq!(parsed, DomContent::Text("hi".to_string()));
    }
}
