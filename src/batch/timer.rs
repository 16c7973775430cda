//! Debounce timer driving idle flushes.
//!
//! A single task owns the deadline. `Reset` pushes it to now + interval,
//! `Cancel` clears it, and when it elapses the task flushes the buffer it
//! points at. The task holds only a weak reference and exits once the
//! buffer is gone or shutdown is signalled.

use parking_lot::Mutex;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::buffer::Inner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TimerCommand {
  Reset,
  Cancel,
}

struct Running {
  shutdown_tx: oneshot::Sender<()>,
  handle: JoinHandle<()>,
}

pub(super) struct DebounceTimer {
  commands: mpsc::UnboundedSender<TimerCommand>,
  running: Mutex<Option<Running>>,
}

impl DebounceTimer {
  pub(super) fn spawn(buffer: Weak<Inner>, interval: Duration) -> Self {
    let (commands, commands_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(run(buffer, interval, commands_rx, shutdown_rx));
    Self {
      commands,
      running: Mutex::new(Some(Running {
        shutdown_tx,
        handle,
      })),
    }
  }

  pub(super) fn send(&self, command: TimerCommand) {
    // Fails only after the task has exited, at which point there is nothing to schedule
    let _ = self.commands.send(command);
  }

  pub(super) async fn stop(&self) {
    let running = self.running.lock().take();
    if let Some(running) = running {
      let _ = running.shutdown_tx.send(());
      if let Err(e) = running.handle.await {
        tracing::warn!("Flush timer ended abnormally: {}", e);
      }
    }
  }
}

impl Drop for DebounceTimer {
  fn drop(&mut self) {
    if let Some(running) = self.running.get_mut().take() {
      let _ = running.shutdown_tx.send(());
    }
  }
}

async fn run(
  buffer: Weak<Inner>,
  interval: Duration,
  mut commands: mpsc::UnboundedReceiver<TimerCommand>,
  mut shutdown_rx: oneshot::Receiver<()>,
) {
  let mut deadline: Option<Instant> = None;

  loop {
    let armed = deadline.is_some();
    let wake_at = deadline.unwrap_or_else(Instant::now);

    tokio::select! {
      biased;
      _ = &mut shutdown_rx => break,
      command = commands.recv() => match command {
        Some(TimerCommand::Reset) => deadline = Some(Instant::now() + interval),
        Some(TimerCommand::Cancel) => deadline = None,
        None => break,
      },
      _ = sleep_until(wake_at), if armed => {
        deadline = None;
        let Some(inner) = buffer.upgrade() else { break };
        match inner.flush().await {
          Ok(0) => {}
          Ok(n) => tracing::debug!("Timer flushed {} clicks", n),
          Err(e) => tracing::error!("Background flush failed, batch dropped: {}", e),
        }
      }
    }
  }

  tracing::debug!("Flush timer stopped");
}
