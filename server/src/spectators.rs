//! Spectator fan-out
//!
//! Every event line the match session emits is written, in order, to every
//! attached spectator. A spectator whose write fails or stalls past the
//! write timeout is dropped; nobody else is affected.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Spectator<W> {
    id: u32,
    writer: W,
}

pub struct SpectatorHub<W> {
    spectators: Vec<Spectator<W>>,
    next_id: u32,
    write_timeout: Duration,
}

impl<W: AsyncWrite + Unpin> SpectatorHub<W> {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            spectators: Vec::new(),
            next_id: 1,
            write_timeout,
        }
    }

    /// Adds a spectator; it only sees events broadcast after this call
    pub fn attach(&mut self, writer: W) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.spectators.push(Spectator { id, writer });
        info!("Spectator {} attached ({} watching)", id, self.spectators.len());
        id
    }

    pub fn len(&self) -> usize {
        self.spectators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectators.is_empty()
    }

    /// Writes one event line to every spectator
    ///
    /// Returns the number of spectators that received it. Failed ones are
    /// removed before this returns.
    pub async fn broadcast(&mut self, line: &str) -> usize {
        let mut failed = Vec::new();

        for spectator in &mut self.spectators {
            let write = async {
                spectator.writer.write_all(line.as_bytes()).await?;
                spectator.writer.flush().await
            };

            match timeout(self.write_timeout, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Spectator {} write failed: {}", spectator.id, e);
                    failed.push(spectator.id);
                }
                Err(_) => {
                    warn!("Spectator {} timed out, dropping it", spectator.id);
                    failed.push(spectator.id);
                }
            }
        }

        if !failed.is_empty() {
            self.spectators.retain(|s| !failed.contains(&s.id));
            info!(
                "Removed {} spectators ({} watching)",
                failed.len(),
                self.spectators.len()
            );
        }

        self.spectators.len()
    }
}

/// Forwards session events to spectators until the event stream closes
///
/// Attach requests are served before pending events, so a spectator that
/// connected before an event was queued for the hub never misses it.
pub async fn run_fanout<W>(
    mut events: mpsc::UnboundedReceiver<String>,
    mut attach: mpsc::UnboundedReceiver<W>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut hub = SpectatorHub::new(write_timeout);
    let mut attach_open = true;

    loop {
        tokio::select! {
            biased;

            writer = attach.recv(), if attach_open => match writer {
                Some(writer) => {
                    hub.attach(writer);
                }
                None => attach_open = false,
            },
            line = events.recv() => match line {
                Some(line) => {
                    hub.broadcast(&line).await;
                }
                None => break,
            },
        }
    }

    info!("Event stream closed, spectator fan-out stopping");
}
