//! Mode Selector (SPEC_FULL §4.H): the `--retrier` flag toggles stream
//! name, consumer group, consumer name, idle threshold, and whether
//! executor invocation is delayed and concurrent.

use std::time::Duration;

/// Primary-stream consumer vs retry-stream consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Primary,
    Retry,
}

/// The full set of bindings a [`Mode`] determines at process start.
#[derive(Debug, Clone)]
pub struct ModeBindings {
    pub mode: Mode,
    pub stream: &'static str,
    pub group: String,
    pub consumer: String,
    pub idle_threshold: Duration,
}

const PRIMARY_IDLE_THRESHOLD: Duration = Duration::from_millis(300_000);
const RETRY_IDLE_THRESHOLD: Duration = Duration::from_millis(5_400_000);

impl ModeBindings {
    #[must_use]
    pub fn for_mode(mode: Mode, pid: u32) -> Self {
        match mode {
            Mode::Primary => Self {
                mode,
                stream: "messages",
                group: "mailer-group".to_string(),
                consumer: format!("mailer-{pid}"),
                idle_threshold: PRIMARY_IDLE_THRESHOLD,
            },
            Mode::Retry => Self {
                mode,
                stream: "retry_queue",
                group: "retrier-group".to_string(),
                consumer: format!("retrier-{pid}"),
                idle_threshold: RETRY_IDLE_THRESHOLD,
            },
        }
    }

    /// Whether dispatch to the executor is delayed (per-entry retry sleep)
    /// and concurrent, as opposed to synchronous-per-batch.
    #[must_use]
    pub const fn is_delayed_and_concurrent(&self) -> bool {
        matches!(self.mode, Mode::Retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_bindings_match_spec() {
        let bindings = ModeBindings::for_mode(Mode::Primary, 42);
        assert_eq!(bindings.stream, "messages");
        assert_eq!(bindings.group, "mailer-group");
        assert_eq!(bindings.consumer, "mailer-42");
        assert_eq!(bindings.idle_threshold, Duration::from_millis(300_000));
        assert!(!bindings.is_delayed_and_concurrent());
    }

    #[test]
    fn retry_bindings_match_spec() {
        let bindings = ModeBindings::for_mode(Mode::Retry, 42);
        assert_eq!(bindings.stream, "retry_queue");
        assert_eq!(bindings.group, "retrier-group");
        assert_eq!(bindings.consumer, "retrier-42");
        assert_eq!(bindings.idle_threshold, Duration::from_millis(5_400_000));
        assert!(bindings.is_delayed_and_concurrent());
    }
}
