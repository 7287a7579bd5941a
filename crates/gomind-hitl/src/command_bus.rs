//! Command delivery (§4.10): a pub/sub channel per checkpoint so a caller
//! awaiting a checkpoint (streaming mode) is woken the moment an operator
//! submits a command, without polling the store.

use dashmap::DashMap;
use gomind_core::Command;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

/// Broadcasts commands to whoever is subscribed on a given checkpoint id.
/// Channels are created lazily on first subscribe or publish and dropped
/// once the last subscriber disconnects and the checkpoint is removed via
/// [`CommandBus::close`].
pub struct CommandBus {
    channels: DashMap<String, broadcast::Sender<Command>>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self { channels: DashMap::new() }
    }
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, checkpoint_id: &str) -> broadcast::Sender<Command> {
        self.channels
            .entry(checkpoint_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Subscribes to commands for a checkpoint. Must be called before
    /// [`CommandBus::publish`] for the subscriber to observe it — there is
    /// no replay buffer, so delivery to a given subscriber is at-most-once.
    pub fn subscribe(&self, checkpoint_id: &str) -> broadcast::Receiver<Command> {
        self.sender_for(checkpoint_id).subscribe()
    }

    /// Publishes a command to a checkpoint's subscribers. Returns the number
    /// of subscribers that received it; zero just means nobody was waiting
    /// on a live stream, which is fine — the checkpoint store is still the
    /// durable record.
    pub fn publish(&self, checkpoint_id: &str, command: Command) -> usize {
        self.sender_for(checkpoint_id).send(command).unwrap_or(0)
    }

    /// Drops the channel for a checkpoint once it reaches a terminal state.
    pub fn close(&self, checkpoint_id: &str) {
        self.channels.remove(checkpoint_id);
    }
}
