// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capacity-one blocking handoff between adjacent pipeline stages.
//!
//! A slot buffer holds at most one item. The producer blocks while the slot
//! is full and the consumer blocks while it is empty, so frames are never
//! dropped or overwritten and are delivered in the order they were produced.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  put   ┌────────────────────────────┐  take  ┌──────────────┐
//!  │ SlotProducer │ ─────► │ Mutex<Slot { item, .. }>   │ ─────► │ SlotConsumer │
//!  └──────────────┘        │ available / emptied Condvar│        └──────────────┘
//!                          └────────────────────────────┘
//!                                       ▲
//!                                       │ wake_all()
//!                                 CancelToken::cancel
//! ```
//!
//! [`slot_buffer`] hands out exactly one [`SlotProducer`] and one
//! [`SlotConsumer`]. Neither is `Clone` and both operations take `&mut self`,
//! so each condition has at most one waiter and `notify_one` always reaches
//! the party that needs it.
//!
//! Every wait loop re-checks cancellation and the peer's presence after each
//! wakeup, under the buffer mutex. Cancellation wins over a pending item: once
//! the token is cancelled every `put` and `take` returns
//! [`SlotError::Cancelled`] and any in-flight frame is discarded.
//!
//! # Example
//!
//! ```
//! use edgefirst_lidarpipe::{buffer::slot_buffer, cancel::CancelToken};
//!
//! let cancel = CancelToken::new();
//! let (mut tx, mut rx) = slot_buffer::<u32>(&cancel);
//!
//! let producer = std::thread::spawn(move || {
//!     for i in 0..3 {
//!         tx.put(i).unwrap();
//!     }
//! });
//!
//! assert_eq!(rx.take().unwrap(), 0);
//! assert_eq!(rx.take().unwrap(), 1);
//! assert_eq!(rx.take().unwrap(), 2);
//! producer.join().unwrap();
//! ```

use crate::cancel::{CancelToken, Wake};
use parking_lot::{Condvar, Mutex};
use std::{
    fmt,
    sync::{Arc, Weak},
};

/// Reason a slot buffer operation returned without transferring an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotError {
    /// The pipeline was cancelled.
    Cancelled,
    /// The other handle was dropped and no item is pending.
    Disconnected,
}

impl std::error::Error for SlotError {}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SlotError::Cancelled => write!(f, "pipeline cancelled"),
            SlotError::Disconnected => write!(f, "peer disconnected"),
        }
    }
}

struct Slot<T> {
    /// `Some` exactly when the slot has data.
    item: Option<T>,
    producer_alive: bool,
    consumer_alive: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    /// Signalled when an item is stored or the producer leaves.
    available: Condvar,
    /// Signalled when the item is taken or the consumer leaves.
    emptied: Condvar,
    cancel: CancelToken,
}

impl<T: Send> Wake for Shared<T> {
    fn wake_all(&self) {
        let _slot = self.slot.lock();
        self.available.notify_all();
        self.emptied.notify_all();
    }
}

/// Create a slot buffer whose waits are interrupted by `cancel`.
pub fn slot_buffer<T: Send + 'static>(
    cancel: &CancelToken,
) -> (SlotProducer<T>, SlotConsumer<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            item: None,
            producer_alive: true,
            consumer_alive: true,
        }),
        available: Condvar::new(),
        emptied: Condvar::new(),
        cancel: cancel.clone(),
    });

    let waker: Weak<Shared<T>> = Arc::downgrade(&shared);
    cancel.register(waker);

    (
        SlotProducer {
            shared: shared.clone(),
        },
        SlotConsumer { shared },
    )
}

/// The single writing end of a slot buffer.
pub struct SlotProducer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SlotProducer<T> {
    /// Store `item`, blocking while the previous item has not been taken.
    ///
    /// Returns [`SlotError::Cancelled`] if the pipeline is cancelled before
    /// the item is stored, and [`SlotError::Disconnected`] if the consumer is
    /// gone. In both cases `item` is dropped.
    pub fn put(&mut self, item: T) -> Result<(), SlotError> {
        let shared = &*self.shared;
        let mut slot = shared.slot.lock();

        loop {
            if shared.cancel.is_cancelled() {
                return Err(SlotError::Cancelled);
            }
            if !slot.consumer_alive {
                return Err(SlotError::Disconnected);
            }
            if slot.item.is_none() {
                break;
            }
            shared.emptied.wait(&mut slot);
        }

        slot.item = Some(item);
        shared.available.notify_one();
        Ok(())
    }

    /// Returns true while an item is waiting to be taken.
    pub fn is_full(&self) -> bool {
        self.shared.slot.lock().item.is_some()
    }
}

impl<T> Drop for SlotProducer<T> {
    fn drop(&mut self) {
        let mut slot = self.shared.slot.lock();
        slot.producer_alive = false;
        self.shared.available.notify_one();
    }
}

/// The single reading end of a slot buffer.
pub struct SlotConsumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SlotConsumer<T> {
    /// Remove and return the pending item, blocking while the slot is empty.
    ///
    /// After the producer is dropped the pending item, if any, is still
    /// delivered; the following call returns [`SlotError::Disconnected`].
    pub fn take(&mut self) -> Result<T, SlotError> {
        let shared = &*self.shared;
        let mut slot = shared.slot.lock();

        loop {
            if shared.cancel.is_cancelled() {
                return Err(SlotError::Cancelled);
            }
            if let Some(item) = slot.item.take() {
                shared.emptied.notify_one();
                return Ok(item);
            }
            if !slot.producer_alive {
                return Err(SlotError::Disconnected);
            }
            shared.available.wait(&mut slot);
        }
    }

    /// Returns true while an item is waiting to be taken.
    pub fn is_full(&self) -> bool {
        self.shared.slot.lock().item.is_some()
    }
}

impl<T> Drop for SlotConsumer<T> {
    fn drop(&mut self) {
        let mut slot = self.shared.slot.lock();
        slot.consumer_alive = false;
        self.shared.emptied.notify_one();
    }
}
