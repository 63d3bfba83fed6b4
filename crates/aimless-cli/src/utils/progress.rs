use crate::ui::UiEvent;
use aimless::engine::progress::{Progress, ProgressCallback, ProgressReporter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Bridges core progress events into the UI manager's channel.
#[derive(Clone)]
pub struct CliProgressHandler {
    sender: mpsc::Sender<UiEvent>,
}

impl CliProgressHandler {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }

    pub fn get_callback(&self) -> ProgressCallback {
        let sender = self.sender.clone();
        Box::new(move |progress: Progress| {
            if let Err(e) = sender.try_send(UiEvent::Progress(progress)) {
                warn!("Failed to send progress update to UI channel: {}", e);
            }
        })
    }

    pub fn reporter(&self) -> Arc<ProgressReporter> {
        ProgressReporter::with_callback(self.get_callback()).shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[tokio::test]
    async fn callback_sends_progress_event() {
        let (sender, mut receiver) = mpsc::channel(1);
        let handler = CliProgressHandler::new(sender);
        let callback = handler.get_callback();

        callback(Progress::WorkerFinished {
            worker: 3,
            accepted: 7,
        });

        match receiver.recv().await.unwrap() {
            UiEvent::Progress(Progress::WorkerFinished { worker, accepted }) => {
                assert_eq!((worker, accepted), (3, 7));
            }
            other => panic!("Incorrect event received: {:?}", other),
        }
    }

    #[test]
    fn reporter_is_usable_from_other_threads() {
        let (sender, mut receiver) = mpsc::channel(8);
        let reporter = CliProgressHandler::new(sender).reporter();

        let shared = Arc::clone(&reporter);
        thread::spawn(move || {
            shared.report(Progress::AttemptLogged {
                worker: 0,
                index: 0,
                accepted: true,
            });
        })
        .join()
        .unwrap();

        assert!(matches!(
            receiver.try_recv(),
            Ok(UiEvent::Progress(Progress::AttemptLogged { accepted: true, .. }))
        ));
    }

    #[test]
    fn full_channel_drops_events_without_blocking() {
        let (sender, _receiver) = mpsc::channel(1);
        let callback = CliProgressHandler::new(sender).get_callback();
        callback(Progress::Message("first".into()));
        callback(Progress::Message("dropped".into()));
    }
}
