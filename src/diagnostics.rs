use tokio::sync::mpsc;

/// Lines buffered by [`Diagnostics::channel`] before overflow goes to stderr.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Process-local channel for pipeline failures (unreachable aggregator,
/// timeouts, misbehaving sinks).
///
/// Diagnostics never go through the logger itself, so a broken sink cannot
/// feed its own failures back into the pipeline.
#[derive(Clone, Debug, Default)]
pub enum Diagnostics {
    /// Print each line to stderr.
    #[default]
    Stderr,
    /// Push each line into a bounded channel owned by the embedder. Lines
    /// that do not fit, or that nobody receives, go to stderr instead.
    Channel(mpsc::Sender<String>),
}

impl Diagnostics {
    /// Build a channel-backed instance together with its receiving end,
    /// holding up to [`DEFAULT_CHANNEL_CAPACITY`] undrained lines.
    pub fn channel() -> (Self, mpsc::Receiver<String>) {
        Self::channel_with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Panics if `capacity` is zero.
    pub fn channel_with_capacity(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Diagnostics::Channel(tx), rx)
    }

    pub fn report(&self, line: impl Into<String>) {
        let line = line.into();
        match self {
            Diagnostics::Stderr => eprintln!("{}", line),
            Diagnostics::Channel(tx) => {
                // Full or closed: stderr rather than block or lose the line.
                match tx.try_send(line) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(line))
                    | Err(mpsc::error::TrySendError::Closed(line)) => eprintln!("{}", line),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_receives_reported_lines() {
        let (diagnostics, mut rx) = Diagnostics::channel();
        diagnostics.report("first");
        diagnostics.clone().report(String::from("second"));

        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn undrained_channel_stays_bounded() {
        let (diagnostics, mut rx) = Diagnostics::channel_with_capacity(2);
        for i in 0..10 {
            diagnostics.report(format!("outage {i}"));
        }

        assert_eq!(rx.try_recv().unwrap(), "outage 0");
        assert_eq!(rx.try_recv().unwrap(), "outage 1");
        assert!(rx.try_recv().is_err());

        diagnostics.report("after drain");
        assert_eq!(rx.try_recv().unwrap(), "after drain");
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (diagnostics, rx) = Diagnostics::channel();
        drop(rx);
        diagnostics.report("nobody listening");
    }
}
