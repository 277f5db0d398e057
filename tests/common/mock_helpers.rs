//! Mock construction helpers

use curvebug_rs::backend::{LinkStats, TracerLink};
use curvebug_rs::error::{CurveBugError, Result};
use curvebug_rs::types::Excitation;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a [`ScriptedLink`] answers to one acquisition
#[derive(Debug, Clone)]
pub enum Reply {
    /// A complete buffer
    Bytes(Vec<u8>),
    /// Nothing arrives before the deadline
    Timeout,
    /// The device is gone
    Unplugged,
}

/// Link that replays a fixed script and records the drives it was asked for
///
/// Once the script runs out every acquisition times out.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    connected: bool,
    replies: VecDeque<Reply>,
    requested: Arc<Mutex<Vec<Excitation>>>,
    stats: LinkStats,
}

impl ScriptedLink {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: replies.into(),
            ..Self::default()
        }
    }

    /// Shared log of requested drives, readable after the link moves to a thread
    pub fn requested(&self) -> Arc<Mutex<Vec<Excitation>>> {
        Arc::clone(&self.requested)
    }
}

impl TracerLink for ScriptedLink {
    fn connect(&mut self, _port: Option<&str>) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn acquire(&mut self, excitation: Excitation, _timeout: Duration) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(CurveBugError::NotConnected);
        }
        self.requested.lock().unwrap().push(excitation);
        match self.replies.pop_front() {
            Some(Reply::Bytes(bytes)) => {
                self.stats.record_frame(0, bytes.len() as u64);
                Ok(bytes)
            }
            Some(Reply::Unplugged) => {
                Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into())
            }
            Some(Reply::Timeout) | None => {
                self.stats.record_timeout();
                Err(CurveBugError::Timeout("scripted".to_string()))
            }
        }
    }

    fn port_name(&self) -> Option<String> {
        self.connected.then(|| "/dev/ttyTEST".to_string())
    }

    fn stats(&self) -> &LinkStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut LinkStats {
        &mut self.stats
    }
}
