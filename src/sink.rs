use signage_model::Image;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::events::SinkCommand;

/// Receives what the scheduler wants on screen. Calls are fire-and-forget:
/// implementations must return immediately and keep any transition work to
/// themselves.
pub trait PresentationSink: Send {
    fn display(&self, image: &Image);
    fn show_empty(&self);
    fn show_no_data(&self);
    fn fallback(&self);
}

/// Forwards commands to a viewer task over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<SinkCommand>,
}

impl ChannelSink {
    pub fn new(tx: Sender<SinkCommand>) -> Self {
        Self { tx }
    }

    fn forward(&self, command: SinkCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!(?command, "viewer queue full; dropping command");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("viewer channel closed; command discarded");
            }
        }
    }
}

impl PresentationSink for ChannelSink {
    fn display(&self, image: &Image) {
        self.forward(SinkCommand::Display(image.clone()));
    }

    fn show_empty(&self) {
        self.forward(SinkCommand::ShowEmpty);
    }

    fn show_no_data(&self) {
        self.forward(SinkCommand::ShowNoData);
    }

    fn fallback(&self) {
        self.forward(SinkCommand::Fallback);
    }
}
