use aimless::engine::progress::Progress;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Debug)]
pub enum UiEvent {
    Progress(Progress),
    Log(String),
}

/// Owns the terminal while a command runs: one bar per worker, log lines printed above them.
pub struct UiManager {
    mp: Arc<MultiProgress>,
    bars: BTreeMap<usize, ProgressBar>,
    event_receiver: mpsc::Receiver<UiEvent>,
    shutdown_receiver: watch::Receiver<bool>,
    _sentinel_bar: ProgressBar,
}

impl UiManager {
    pub fn new() -> (Self, mpsc::Sender<UiEvent>, watch::Sender<bool>) {
        let (event_sender, event_receiver) = mpsc::channel(1024);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let mp = Arc::new(MultiProgress::new());
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        let _sentinel_bar = mp.add(ProgressBar::hidden());
        let manager = Self {
            mp,
            bars: BTreeMap::new(),
            event_receiver,
            shutdown_receiver,
            _sentinel_bar,
        };

        (manager, event_sender, shutdown_sender)
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.event_receiver.recv() => {
                    self.handle_event(event);
                }
                result = self.shutdown_receiver.changed() => {
                    if result.is_err() || *self.shutdown_receiver.borrow() {
                        break;
                    }
                }
            }
        }
        while let Ok(event) = self.event_receiver.try_recv() {
            self.handle_event(event);
        }
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        self._sentinel_bar.finish_and_clear();
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Log(msg) => {
                self.mp.println(msg).ok();
            }
            UiEvent::Progress(progress) => self.handle_progress(progress),
        }
    }

    fn handle_progress(&mut self, progress: Progress) {
        match progress {
            Progress::WorkerStarted {
                worker,
                target,
                already_accepted,
            } => {
                let pb = self.mp.add(ProgressBar::new(target as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("worker {:>2}", worker));
                pb.set_position(already_accepted.min(target) as u64);
                pb.set_message("0 attempts");
                if let Some(old) = self.bars.insert(worker, pb) {
                    old.finish_and_clear();
                }
            }
            Progress::AttemptLogged {
                worker,
                index,
                accepted,
            } => {
                if let Some(bar) = self.bars.get(&worker) {
                    if accepted {
                        bar.inc(1);
                    }
                    bar.set_message(format!("{} attempts", index + 1));
                }
            }
            Progress::WorkerFinished { worker, accepted } => {
                if let Some(bar) = self.bars.get(&worker) {
                    bar.set_position(accepted as u64);
                    bar.finish_with_message("✓ done");
                }
            }
            Progress::WorkerFailed { worker, reason } => {
                if let Some(bar) = self.bars.get(&worker) {
                    bar.abandon_with_message(format!("✗ {}", reason));
                }
            }
            Progress::RecordsMerged { total } => {
                self.mp
                    .println(format!("  master log now holds {} entries", total))
                    .ok();
            }
            Progress::Message(msg) => {
                self.mp.println(format!("  {}", msg)).ok();
            }
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {pos}/{len} accepted ({msg})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸ ")
    }
}
