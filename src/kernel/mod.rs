// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Core
//!
//! The kernel proper: thread table, ready queue, mailbox table and the
//! interrupt entry shim that ties them together.
//!
//! # Design
//!
//! - All mutable kernel state lives in one [`Kernel`] value; every
//!   operation takes it by exclusive reference
//! - A single process-wide instance sits behind a spinlock; the lock is
//!   never contended because every kernel entry runs with interrupts
//!   masked on the one core
//! - Control flow per trap/interrupt: save the interrupted stack pointer,
//!   run the registered handler, reschedule, hand the new current
//!   thread's context back for the platform to resume
//!
//! # Fatal conditions
//!
//! Protocol violations (a second receiver on a mailbox, no runnable
//! thread at schedule time) and unrecoverable exhaustion (message-node
//! allocation failure, stack arena overflow) halt the system through
//! [`down`]; there is no supervisor to restart an embedded target, so no
//! recovery is attempted.

pub mod context;
pub mod msgbox;
pub mod port;
pub mod sched;
pub mod syscall;
pub mod thread;


use core::ptr::NonNull;

use log::{error, info};
use spin::Mutex;

use crate::kernel::context::StackArena;
use crate::kernel::msgbox::MsgBox;
use crate::kernel::port::{IntrHandler, Port, SoftVec};
use crate::kernel::sched::ReadyQueue;
use crate::kernel::syscall::SyscallBlock;
use crate::kernel::thread::{Tcb, ThreadFn, ThreadId};

/// Thread table capacity.
pub const THREAD_MAX: usize = 6;

/// Number of priority levels; 0 is highest and non-preemptible, 15 is the
/// idle level.
pub const PRIORITY_LEVELS: usize = 16;

/// Number of mailboxes.
pub const MSGBOX_COUNT: usize = 16;

/// All kernel state: thread table, ready queue, mailbox table, interrupt
/// handler table, stack arena and the current-thread selector.
///
/// `current` is `None` only transiently, while a service call runs on
/// behalf of an interrupt handler; the reschedule that ends every
/// interrupt entry re-selects a valid thread before any thread code runs.
pub struct Kernel {
    pub(crate) threads: [Tcb; THREAD_MAX],
    pub(crate) ready: ReadyQueue,
    pub(crate) msgboxes: [MsgBox; MSGBOX_COUNT],
    pub(crate) handlers: [Option<IntrHandler>; SoftVec::COUNT],
    pub(crate) current: Option<usize>,
    pub(crate) arena: StackArena,
    pub(crate) port: Port,
}

// SAFETY: the kernel runs on a single core and every entry point executes
// with interrupts masked, so the raw pointers held in TCBs and mailboxes
// are never touched from two contexts at once.
unsafe impl Send for Kernel {}

impl Kernel {
    /// Create a kernel with an empty thread table and the given platform
    /// collaborators.
    pub fn new(port: Port) -> Self {
        const FREE: Tcb = Tcb::FREE;
        const MBOX: MsgBox = MsgBox::EMPTY;

        Self {
            threads: [FREE; THREAD_MAX],
            ready: ReadyQueue::new(),
            msgboxes: [MBOX; MSGBOX_COUNT],
            handlers: [None; SoftVec::COUNT],
            current: None,
            arena: StackArena::new(),
            port,
        }
    }

    /// Boot the kernel: register the built-in trap handlers, spawn the
    /// initial thread and return its saved context for the platform to
    /// resume. The initial thread conventionally starts at priority 0 and
    /// demotes itself to the idle level once the system threads are up.
    pub fn start(
        &mut self,
        entry: ThreadFn,
        name: &str,
        priority: usize,
        stack_size: usize,
        argc: i32,
        argv: *mut *mut u8,
    ) -> usize {
        self.current = None;
        self.set_intr_handler(SoftVec::Syscall, syscall::syscall_intr);
        self.set_intr_handler(SoftVec::SoftErr, syscall::softerr_intr);

        info!("kernel up, spawning {:?}", name);
        if self
            .spawn(entry, name, priority, stack_size, argc, argv)
            .is_err()
        {
            down("unable to spawn the initial thread");
        }
        self.current_context()
    }

    /// Interrupt entry shim, shared by every vector.
    ///
    /// Saves the interrupted thread's stack pointer, runs the handler
    /// registered for `vector`, reschedules, and returns the new current
    /// thread's saved stack pointer. The caller (the platform's vector
    /// stub) must resume that context; the resume primitive itself never
    /// returns.
    pub fn interrupt_entry(&mut self, vector: SoftVec, sp: usize) -> usize {
        if let Some(cur) = self.current {
            self.threads[cur].set_context_sp(sp);
        }
        if let Some(handler) = self.handlers[vector as usize] {
            handler(self);
        }
        self.schedule();
        self.current_context()
    }

    /// Identity of the thread presently owning the CPU, if any.
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current.map(ThreadId)
    }

    /// Saved stack pointer of the current thread; the value handed to the
    /// context-switch primitive. Resuming with no current thread is fatal.
    pub fn current_context(&self) -> usize {
        match self.current {
            Some(cur) => self.threads[cur].context_sp(),
            None => down("resume with no current thread"),
        }
    }
}

/// Fatal halt: log a diagnostic and stop making progress. Under `cfg(test)`
/// this panics instead so the halting paths stay testable.
pub(crate) fn down(msg: &str) -> ! {
    error!("kernel down: {}", msg);
    #[cfg(test)]
    panic!("kernel down: {}", msg);
    #[cfg(not(test))]
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Process-wide instance
// ============================================================================

/// The process-wide kernel instance.
///
/// The lock encodes the interrupt-masking discipline at the type level; on
/// the single core it is never actually contended.
static KERNEL: Mutex<Option<Kernel>> = Mutex::new(None);

/// Install the process-wide kernel instance.
pub fn init(port: Port) {
    *KERNEL.lock() = Some(Kernel::new(port));
}

/// Run `f` against the process-wide kernel instance.
pub fn with<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    let mut guard = KERNEL.lock();
    match guard.as_mut() {
        Some(kernel) => f(kernel),
        None => down("kernel not initialized"),
    }
}

/// Boot the process-wide kernel; see [`Kernel::start`].
pub fn start(
    entry: ThreadFn,
    name: &str,
    priority: usize,
    stack_size: usize,
    argc: i32,
    argv: *mut *mut u8,
) -> usize {
    with(|k| k.start(entry, name, priority, stack_size, argc, argv))
}

/// Interrupt entry point for the platform's vector stubs; see
/// [`Kernel::interrupt_entry`].
pub fn interrupt(vector: SoftVec, sp: usize) -> usize {
    with(|k| k.interrupt_entry(vector, sp))
}

/// Issue a system call from thread context: record the parameter block as
/// the caller's pending request, then take the software trap. The result
/// slot is valid once the thread is scheduled again.
pub fn syscall(block: &mut SyscallBlock) {
    let trap = with(|k| {
        k.syscall_request(NonNull::from(&mut *block));
        k.port.trap
    });
    trap();
}
