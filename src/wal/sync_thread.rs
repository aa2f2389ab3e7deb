//! Background WAL sync loop.
//!
//! Spawned the way the teacher spawns its background maintenance threads
//! (plain `std::thread::spawn`, joined on shutdown — no `tokio` needed,
//! per SPEC_FULL.md §4.5: this crate's core stays synchronous and only the
//! applier uses async I/O). Writers notify the thread over a
//! `crossbeam_channel` after every `return_used`; the thread also wakes on
//! a short timeout so a lone unflushed slot doesn't wait forever for a
//! second writer to nudge it.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use super::Slots;

pub struct SyncThreadHandle {
    shutdown: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SyncThreadHandle {
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// A cloneable nudge the writer side holds to wake the sync thread after
/// returning a slot, instead of waiting for the poll timeout.
#[derive(Clone)]
pub struct SyncNudge {
    tx: Sender<()>,
}

impl SyncNudge {
    pub fn nudge(&self) {
        let _ = self.tx.try_send(());
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn spawn(slots: Arc<Slots>) -> (SyncNudge, SyncThreadHandle) {
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let (nudge_tx, nudge_rx) = bounded::<()>(16);

    let join = std::thread::spawn(move || run(slots, nudge_rx, shutdown_rx));

    (
        SyncNudge { tx: nudge_tx },
        SyncThreadHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        },
    )
}

fn run(slots: Arc<Slots>, nudge: Receiver<()>, shutdown: Receiver<()>) {
    loop {
        crossbeam_channel::select! {
            recv(shutdown) -> _ => {
                drain(&slots);
                return;
            }
            recv(nudge) -> _ => drain(&slots),
            default(POLL_INTERVAL) => drain(&slots),
        }
    }
}

fn drain(slots: &Arc<Slots>) {
    while let Some(region) = slots.get_sync_region() {
        if region.is_empty() {
            break;
        }
        if let Err(e) = slots.return_sync_region(region) {
            tracing::error!(error = %e, "WAL sync region failed");
            break;
        }
    }
}
