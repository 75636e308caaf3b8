use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::TransitionConfig;
use crate::events::SinkCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Blank,
    Showing { id: u64, url: String },
    EmptyNotice,
    NoDataNotice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenChange {
    pub from: Screen,
    pub to: Screen,
}

/// What is currently on the display surface.
#[derive(Debug)]
pub struct Surface {
    screen: Screen,
    fallbacks: usize,
}

impl Surface {
    pub fn new() -> Self {
        Self {
            screen: Screen::Blank,
            fallbacks: 0,
        }
    }

    pub fn current(&self) -> &Screen {
        &self.screen
    }

    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    /// `None` when the command leaves the screen as it was.
    pub fn apply(&mut self, command: &SinkCommand) -> Option<ScreenChange> {
        match command {
            SinkCommand::Display(image) => self.goto(Screen::Showing {
                id: image.id,
                url: image.url.clone(),
            }),
            SinkCommand::ShowEmpty => self.goto(Screen::EmptyNotice),
            SinkCommand::ShowNoData => self.goto(Screen::NoDataNotice),
            SinkCommand::Fallback => {
                self.fallbacks += 1;
                None
            }
        }
    }

    fn goto(&mut self, to: Screen) -> Option<ScreenChange> {
        if self.screen == to {
            return None;
        }
        let from = std::mem::replace(&mut self.screen, to.clone());
        Some(ScreenChange { from, to })
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

/// Presents scheduler commands. The cross-fade is reported, not waited on,
/// so it never shifts an image's on-screen time.
#[instrument(skip_all, fields(fade_ms = transition.fade.as_millis() as u64))]
pub async fn run(
    mut commands: Receiver<SinkCommand>,
    transition: TransitionConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut surface = Surface::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting viewer task");
                break;
            }

            maybe_cmd = commands.recv() => {
                let Some(command) = maybe_cmd else {
                    debug!("scheduler side closed");
                    break;
                };
                let change = surface.apply(&command);
                present(&command, change, transition.fade);
            }
        }
    }

    Ok(())
}

fn present(command: &SinkCommand, change: Option<ScreenChange>, fade: Duration) {
    match (command, change) {
        (SinkCommand::Display(image), Some(change)) => {
            let fade_ms = if change.from == Screen::Blank {
                0
            } else {
                fade.as_millis() as u64
            };
            info!(id = image.id, url = %image.url, fade_ms, "showing image");
        }
        (SinkCommand::Display(image), None) => {
            debug!(id = image.id, "image stays on screen for another turn");
        }
        (SinkCommand::ShowEmpty, Some(_)) => {
            info!("no image scheduled right now; showing placeholder");
        }
        (SinkCommand::ShowNoData, Some(_)) => {
            warn!("image collection is empty; showing no-data notice");
        }
        (SinkCommand::Fallback, _) => {
            warn!("no images configured; add one with `signage-frame images add --url <URL>`");
        }
        (_, None) => {}
    }
}
