//! A bounded single-producer, single-consumer queue carrying [`SynthCommand`]s
//! from the control thread to the audio thread.
//!
//! The receiving side never blocks or allocates. The sending side blocks when
//! the queue is full and wakes up when the audio thread takes a command.

use crate::message::SynthCommand;
use basedrop::Handle;
use ringbuf_basedrop as ringbuf;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    time::Duration,
};
use thiserror::Error;

/// Longest a blocked sender sleeps before checking the queue again.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(1);

#[derive(Error, Debug)]
pub enum SendError {
    #[error("the audio engine has shut down")]
    Disconnected,
}

#[derive(Error, Debug)]
pub enum TrySendError {
    #[error("the command queue is full")]
    Full(SynthCommand),
    #[error("the audio engine has shut down")]
    Disconnected(SynthCommand),
}

impl TrySendError {
    /// Recovers the command that could not be sent.
    pub fn into_inner(self) -> SynthCommand {
        match self {
            TrySendError::Full(command) | TrySendError::Disconnected(command) => command,
        }
    }
}

/// Creates a command queue holding up to `capacity` commands.
pub fn command_channel(capacity: usize, handle: &Handle) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = ringbuf::RingBuffer::new(capacity.max(1)).split(handle);
    let (notify_tx, notify_rx) = mpsc::sync_channel(1);
    let open = Arc::new(AtomicBool::new(true));
    (
        CommandSender {
            queue: tx,
            notify: notify_rx,
            open: Arc::clone(&open),
        },
        CommandReceiver {
            queue: rx,
            notify: notify_tx,
            open,
        },
    )
}

pub struct CommandSender {
    queue: ringbuf::Producer<SynthCommand>,
    notify: mpsc::Receiver<()>,
    open: Arc<AtomicBool>,
}

impl CommandSender {
    /// Sends a command, waiting for space if the queue is full.
    pub fn send(&mut self, mut command: SynthCommand) -> Result<(), SendError> {
        loop {
            match self.try_send(command) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(_)) => return Err(SendError::Disconnected),
                Err(TrySendError::Full(rejected)) => {
                    command = rejected;
                    self.notify.recv_timeout(BACKPRESSURE_POLL).ok();
                }
            }
        }
    }

    /// Sends a command if there is space for it.
    pub fn try_send(&mut self, command: SynthCommand) -> Result<(), TrySendError> {
        if !self.is_connected() {
            return Err(TrySendError::Disconnected(command));
        }
        self.queue.push(command).map_err(TrySendError::Full)
    }

    /// Whether the receiving side still exists.
    pub fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Number of commands waiting to be received.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

pub struct CommandReceiver {
    queue: ringbuf::Consumer<SynthCommand>,
    notify: mpsc::SyncSender<()>,
    open: Arc<AtomicBool>,
}

impl CommandReceiver {
    /// Takes the oldest pending command without blocking.
    pub fn try_receive(&mut self) -> Option<SynthCommand> {
        let command = self.queue.pop()?;
        // A wake-up is already pending if this fails.
        self.notify.try_send(()).ok();
        Some(command)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Drop for CommandReceiver {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}
