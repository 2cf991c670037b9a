// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::time::deadline_after;
use futures::Stream;
use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, trace};

/// A trailing-edge debouncer keyed by string.
///
/// Each key is emitted once the key has gone a full quiet period without a
/// [`notify`](Self::notify). Keys are independent of each other.
///
/// All timer state is owned by a single background task. `notify`, `set_interval` and `close`
/// are messages to that task, so restarting a key's timer can never race with the timer firing.
#[derive(Debug)]
pub struct Debouncer {
    handle: DebounceHandle,
    events: Option<UnboundedReceiver<String>>,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Spawns the debouncer's background task with the given quiet period.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(interval: Duration) -> Self {
        let (command_tx, command_rx) = unbounded_channel();
        let (event_tx, event_rx) = unbounded_channel();
        let task = tokio::spawn(coordinate(interval, command_rx, event_tx));
        debug!(?interval, "spawned debouncer");

        Self {
            handle: DebounceHandle {
                commands: command_tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            events: Some(event_rx),
            task,
        }
    }

    /// Returns a handle that can be cloned and used from other tasks.
    pub fn handle(&self) -> DebounceHandle {
        self.handle.clone()
    }

    /// Records that `key` changed now.
    pub fn notify(&self, key: impl Into<String>) {
        self.handle.notify(key);
    }

    /// Changes the quiet period for timers started after this call.
    pub fn set_interval(&self, interval: Duration) {
        self.handle.set_interval(interval);
    }

    /// Returns the stream of debounced keys.
    ///
    /// There is a single stream per debouncer. Calls after the first, or after
    /// [`close`](Self::close), return a stream that has already finished.
    pub fn events(&mut self) -> DebouncedEvents {
        let receiver = if self.handle.is_closed() {
            None
        } else {
            self.events.take()
        };
        DebouncedEvents {
            receiver,
            closed: self.handle.closed.clone(),
        }
    }

    /// Cancels every pending timer and ends the event stream.
    ///
    /// Keys that were already debounced but not yet read from the stream are discarded. Calling
    /// this more than once has no further effect.
    pub fn close(&self) {
        if self.handle.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing debouncer");
        // The task may have exited already if every handle was dropped.
        _ = self.handle.commands.send(Command::Close);
    }

    /// Returns true if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Closes the debouncer and waits for its background task to exit.
    pub async fn shutdown(self) {
        self.close();
        if let Err(err) = self.task.await {
            debug!(%err, "debouncer task did not exit cleanly");
        }
    }
}

/// A cloneable handle for sending notifications to a [`Debouncer`].
#[derive(Clone, Debug)]
pub struct DebounceHandle {
    commands: UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
}

impl DebounceHandle {
    /// Records that `key` changed now. Does nothing once the debouncer is closed.
    pub fn notify(&self, key: impl Into<String>) {
        if self.is_closed() {
            return;
        }
        _ = self.commands.send(Command::Notify(key.into()));
    }

    /// Changes the quiet period for timers started after this call. Does nothing once the
    /// debouncer is closed.
    pub fn set_interval(&self, interval: Duration) {
        if self.is_closed() {
            return;
        }
        _ = self.commands.send(Command::SetInterval(interval));
    }

    /// Returns true if the debouncer has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// The stream of keys produced by a [`Debouncer`].
#[derive(Debug)]
pub struct DebouncedEvents {
    receiver: Option<UnboundedReceiver<String>>,
    closed: Arc<AtomicBool>,
}

impl Stream for DebouncedEvents {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if self.closed.load(Ordering::Acquire) {
            self.receiver = None;
        }
        match &mut self.receiver {
            Some(receiver) => receiver.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

#[derive(Debug)]
enum Command {
    Notify(String),
    SetInterval(Duration),
    Close,
}

async fn coordinate(
    mut interval: Duration,
    mut commands: UnboundedReceiver<Command>,
    events: UnboundedSender<String>,
) {
    // At most one deadline per key: a notify replaces the key's deadline.
    let mut deadlines: HashMap<String, Instant> = HashMap::new();

    loop {
        let next_deadline = deadlines.values().min().copied();

        tokio::select! {
            // Queued commands win over a deadline that is due at the same time, so a notify that
            // has been sent is always applied before the key can fire.
            biased;

            command = commands.recv() => match command {
                Some(Command::Notify(key)) => {
                    trace!(%key, "restarting debounce timer");
                    deadlines.insert(key, deadline_after(Instant::now(), interval));
                }
                Some(Command::SetInterval(new_interval)) => {
                    debug!(?new_interval, "debounce interval changed");
                    interval = new_interval;
                }
                Some(Command::Close) | None => break,
            },

            () = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                let now = Instant::now();
                let mut due: Vec<(String, Instant)> = deadlines
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(key, deadline)| (key.clone(), *deadline))
                    .collect();
                due.sort_unstable_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

                for (key, _) in due {
                    deadlines.remove(&key);
                    trace!(%key, "debounce timer fired");
                    if events.send(key).is_err() {
                        debug!("debounced event stream was dropped, stopping");
                        return;
                    }
                }
            }
        }
    }

    debug!(pending = deadlines.len(), "debouncer stopped");
}
