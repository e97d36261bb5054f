//! Status reporter (C6): deduplicated lifecycle events for an optional
//! observer.

use crate::error::DownReason;
use bytes::Bytes;
use tracing::trace;

/// A lifecycle notification. `PartialEq` is what drives deduplication: an
/// emit that would repeat the last delivered value is dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    ConnectionUp,
    ConnectionDown(DownReason),
    QueueFull,
    QueueOk,
}

/// A status delivered to the observer, tagged with the endpoint it describes.
#[derive(Clone, Debug)]
pub struct StatusEvent {
    pub host: String,
    pub port: u16,
    pub cluster_id: Option<Bytes>,
    pub status: Status,
}

/// An optional sink for [`StatusEvent`]s. Delivery is fire-and-forget: if the
/// observer dropped its receiver, events are silently discarded rather than
/// treated as an error.
pub type StatusSink = tokio::sync::mpsc::UnboundedSender<StatusEvent>;

/// Holds `last_status` and only forwards a [`Status`] to the sink when it
/// differs from the previous one, so `queue_full`/`queue_ok` can't flap and
/// repeated `connect_error`s during the same down interval don't spam a
/// subscriber with identical events.
pub(crate) struct StatusReporter {
    host: String,
    port: u16,
    sink: Option<StatusSink>,
    last_status: Option<Status>,
}

impl StatusReporter {
    pub(crate) fn new(host: String, port: u16, sink: Option<StatusSink>) -> Self {
        StatusReporter {
            host,
            port,
            sink,
            last_status: None,
        }
    }

    pub(crate) fn emit(&mut self, cluster_id: Option<&Bytes>, status: Status) {
        if self.last_status.as_ref() == Some(&status) {
            trace!(?status, "status unchanged, suppressing duplicate emit");
            return;
        }
        self.last_status = Some(status.clone());
        if let Some(sink) = &self.sink {
            let event = StatusEvent {
                host: self.host.clone(),
                port: self.port,
                cluster_id: cluster_id.cloned(),
                status,
            };
            // A dropped receiver just means nobody is listening anymore.
            let _ = sink.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_status_is_suppressed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut reporter = StatusReporter::new("h".into(), 1, Some(tx));

        reporter.emit(None, Status::QueueFull);
        reporter.emit(None, Status::QueueFull);
        reporter.emit(None, Status::QueueOk);
        reporter.emit(None, Status::QueueOk);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.status, Status::QueueFull);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.status, Status::QueueOk);
        assert!(rx.try_recv().is_err());
    }
}
