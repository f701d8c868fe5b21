//! [`DecisionService`] – the seam between the control loop and whatever
//! produces remote commands.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use brainstem_types::{ActuationCommand, SensorSnapshot};

/// Point-in-time view of a link, for status lines and reports.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStats {
    pub endpoint: String,
    pub connected: bool,
    /// Consecutive failed connection attempts since the last success.
    pub attempts: u32,
    /// Commands successfully received over the lifetime of the link.
    pub successes: u64,
    /// Time since the last successful contact; `None` if there never was one.
    pub staleness: Option<Duration>,
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let staleness = match self.staleness {
            Some(d) => format!("{:.1}s", d.as_secs_f64()),
            None => "inf".to_string(),
        };
        write!(
            f,
            "{} connected={} attempts={} successes={} staleness={}",
            self.endpoint, self.connected, self.attempts, self.successes, staleness
        )
    }
}

/// A source of remote [`ActuationCommand`]s.
///
/// Failures never surface as errors: `connect` reports success as a `bool`
/// and `exchange` returns `None` for every "no usable command" outcome.  After
/// a `None`, [`is_connected`][Self::is_connected] tells the caller whether the
/// session survived.
#[async_trait]
pub trait DecisionService: Send {
    /// Open a session, replacing any existing one.
    async fn connect(&mut self) -> bool;

    /// Send one snapshot and wait for the matching command.
    async fn exchange(&mut self, snapshot: &SensorSnapshot) -> Option<ActuationCommand>;

    /// Close the session.  Always leaves the link disconnected.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn stats(&self) -> LinkStats;
}

#[async_trait]
impl<T: DecisionService + ?Sized> DecisionService for Box<T> {
    async fn connect(&mut self) -> bool {
        (**self).connect().await
    }

    async fn exchange(&mut self, snapshot: &SensorSnapshot) -> Option<ActuationCommand> {
        (**self).exchange(snapshot).await
    }

    async fn disconnect(&mut self) {
        (**self).disconnect().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn stats(&self) -> LinkStats {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_contacted_renders_infinite_staleness() {
        let stats = LinkStats {
            endpoint: "ws://localhost:9977".into(),
            connected: false,
            attempts: 3,
            successes: 0,
            staleness: None,
        };
        let line = stats.to_string();
        assert!(line.contains("staleness=inf"));
        assert!(line.contains("attempts=3"));
    }

    #[test]
    fn staleness_renders_seconds() {
        let stats = LinkStats {
            endpoint: "ws://brain:9977".into(),
            connected: true,
            attempts: 0,
            successes: 42,
            staleness: Some(Duration::from_millis(1500)),
        };
        assert!(stats.to_string().contains("staleness=1.5s"));
    }
}
