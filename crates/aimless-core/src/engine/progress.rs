use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Progress {
    WorkerStarted {
        worker: usize,
        target: usize,
        already_accepted: usize,
    },
    AttemptLogged {
        worker: usize,
        index: usize,
        accepted: bool,
    },
    WorkerFinished {
        worker: usize,
        accepted: usize,
    },
    WorkerFailed {
        worker: usize,
        reason: String,
    },
    RecordsMerged {
        total: usize,
    },

    Message(String),
}

pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Forwards progress events to an optional callback.
///
/// Reporters are shared between concurrently running workers, so the callback must
/// be `Send + Sync`; use [`ProgressReporter::shared`] to hand one out.
#[derive(Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_is_silent() {
        ProgressReporter::new().report(Progress::Message("ignored".into()));
    }

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::with_callback(Box::new(move |p| {
            if let Progress::AttemptLogged { index, accepted, .. } = p {
                sink.lock().unwrap().push((index, accepted));
            }
        }));
        reporter.report(Progress::AttemptLogged {
            worker: 0,
            index: 3,
            accepted: true,
        });
        reporter.report(Progress::Message("not recorded".into()));
        assert_eq!(*seen.lock().unwrap(), vec![(3, true)]);
    }
}
