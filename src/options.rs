//! Configuration surface, §6 of the design: one struct of knobs validated
//! once at `start()`, following the teacher's `Cli` (clap-derived options
//! struct validated before use) convention but for a library entry point
//! rather than a binary's `main`.

use crate::error::ConfigError;
use crate::status::StatusSink;
use std::time::Duration;

/// Options forwarded to the `Connection` collaborator. Only host/port are
/// used by the default TCP connector in this revision; TLS configuration is
/// reserved for a later revision (a Non-goal here, same as in the spec this
/// crate implements).
#[derive(Clone, Debug)]
pub struct ConnectionOpts {
    pub host: String,
    pub port: u16,
}

/// Tunables for a [`crate::NodeClient`]. Defaults match §6.
#[derive(Clone)]
pub struct NodeClientOptions {
    pub connection_opts: ConnectionOpts,
    pub max_waiting: usize,
    pub max_pending: usize,
    pub queue_ok_level: usize,
    pub reconnect_wait: Duration,
    pub status_sink: Option<StatusSink>,
    pub resp_version: u8,
    pub node_down_timeout: Duration,
    pub use_cluster_id: bool,
}

impl NodeClientOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        NodeClientOptions {
            connection_opts: ConnectionOpts {
                host: host.into(),
                port,
            },
            max_waiting: 5000,
            max_pending: 128,
            queue_ok_level: 2000,
            reconnect_wait: Duration::from_millis(1000),
            status_sink: None,
            resp_version: 3,
            node_down_timeout: Duration::from_millis(3000),
            use_cluster_id: false,
        }
    }

    pub fn max_waiting(mut self, v: usize) -> Self {
        self.max_waiting = v;
        self
    }

    pub fn max_pending(mut self, v: usize) -> Self {
        self.max_pending = v;
        self
    }

    pub fn queue_ok_level(mut self, v: usize) -> Self {
        self.queue_ok_level = v;
        self
    }

    pub fn reconnect_wait(mut self, v: Duration) -> Self {
        self.reconnect_wait = v;
        self
    }

    pub fn status_sink(mut self, v: StatusSink) -> Self {
        self.status_sink = Some(v);
        self
    }

    pub fn resp_version(mut self, v: u8) -> Self {
        self.resp_version = v;
        self
    }

    pub fn node_down_timeout(mut self, v: Duration) -> Self {
        self.node_down_timeout = v;
        self
    }

    pub fn use_cluster_id(mut self, v: bool) -> Self {
        self.use_cluster_id = v;
        self
    }

    /// Validates the combination of options, following §6's rule that an
    /// invalid configuration is a fatal error caught at `start()` rather than
    /// silently clamped.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_ok_level >= self.max_waiting {
            return Err(ConfigError::QueueOkLevelNotBelowMaxWaiting {
                queue_ok_level: self.queue_ok_level,
                max_waiting: self.max_waiting,
            });
        }
        if self.max_pending == 0 {
            return Err(ConfigError::MaxPendingZero);
        }
        if self.resp_version != 2 && self.resp_version != 3 {
            return Err(ConfigError::InvalidRespVersion(self.resp_version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        NodeClientOptions::new("127.0.0.1", 6379).validate().unwrap();
    }

    #[test]
    fn queue_ok_level_must_be_below_max_waiting() {
        let err = NodeClientOptions::new("127.0.0.1", 6379)
            .max_waiting(10)
            .queue_ok_level(10)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::QueueOkLevelNotBelowMaxWaiting { .. }
        ));
    }

    #[test]
    fn resp_version_must_be_2_or_3() {
        let err = NodeClientOptions::new("127.0.0.1", 6379)
            .resp_version(4)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRespVersion(4)));
    }
}
