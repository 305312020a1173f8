// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Ready Queue and Scheduler
//!
//! # Design
//!
//! - 16 FIFO lists, one per priority level; the links are intrusive
//!   (`Tcb::next`), so a thread is on at most one list at a time
//! - The running thread stays at the head of its level: `take_current`
//!   pops it, `put_current` re-admits it at the tail
//! - `schedule` picks the head of the lowest-numbered non-empty level;
//!   it runs exactly once per interrupt entry, after the handler is done
//!   mutating the queues

use log::trace;

use crate::kernel::thread::ThreadFlags;
use crate::kernel::{down, Kernel, PRIORITY_LEVELS};

/// One FIFO ready-queue level. Both ends are unset iff the level is empty.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Level {
    pub(crate) head: Option<usize>,
    pub(crate) tail: Option<usize>,
}

impl Level {
    pub(crate) const EMPTY: Level = Level {
        head: None,
        tail: None,
    };
}

/// The per-priority ready queue; the scheduler's sole source of truth for
/// "runnable".
pub struct ReadyQueue {
    pub(crate) levels: [Level; PRIORITY_LEVELS],
}

impl ReadyQueue {
    pub(crate) const fn new() -> Self {
        Self {
            levels: [Level::EMPTY; PRIORITY_LEVELS],
        }
    }
}

impl Kernel {
    /// Pop the current thread off its ready-queue level ("get current").
    ///
    /// Every call path does this before touching any other state; an
    /// operation that wants its caller to keep running must `put_current`
    /// afterwards. A no-op when there is no current thread or it is not
    /// queued.
    pub(crate) fn take_current(&mut self) {
        let Some(cur) = self.current else {
            return;
        };
        if !self.threads[cur].flags.contains(ThreadFlags::READY) {
            return;
        }

        // The running thread is always the head of its level.
        let priority = self.threads[cur].priority;
        self.ready.levels[priority].head = self.threads[cur].next;
        if self.ready.levels[priority].head.is_none() {
            self.ready.levels[priority].tail = None;
        }
        self.threads[cur].flags.remove(ThreadFlags::READY);
        self.threads[cur].next = None;
        trace!("ready-: {} level={}", self.threads[cur].name(), priority);
    }

    /// Append the current thread to the tail of its level ("put current").
    ///
    /// A no-op when there is no current thread or it is already queued.
    /// Omitting this after `take_current` is exactly how a thread blocks.
    pub(crate) fn put_current(&mut self) {
        let Some(cur) = self.current else {
            return;
        };
        if self.threads[cur].flags.contains(ThreadFlags::READY) {
            return;
        }

        let priority = self.threads[cur].priority;
        match self.ready.levels[priority].tail {
            Some(tail) => self.threads[tail].next = Some(cur),
            None => self.ready.levels[priority].head = Some(cur),
        }
        self.ready.levels[priority].tail = Some(cur);
        self.threads[cur].flags.insert(ThreadFlags::READY);
        trace!("ready+: {} level={}", self.threads[cur].name(), priority);
    }

    /// Select the next thread to run: the head of the lowest-numbered
    /// non-empty level. An empty queue across every level is fatal; a
    /// correctly configured system always keeps an idle thread ready.
    pub(crate) fn schedule(&mut self) {
        for level in &self.ready.levels {
            if let Some(head) = level.head {
                self.current = Some(head);
                return;
            }
        }
        down("no runnable thread");
    }
}
