use tokio::sync::mpsc;

/// Lifecycle of one engine invocation. Progress is best-effort; only
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeEvent {
    Started { label: String, command: String },
    Progress { label: String, progress: EngineProgress },
    Completed { label: String, size: u64 },
    Failed { label: String, error: String },
}

impl TranscodeEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineProgress {
    /// Only known when the input duration could be read.
    pub percent: Option<f64>,
    pub out_time_ms: u64,
    pub speed: Option<f64>,
}

pub type EventSender = mpsc::UnboundedSender<TranscodeEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TranscodeEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
