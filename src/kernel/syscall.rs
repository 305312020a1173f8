// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! System-Call and Service-Call Dispatch
//!
//! # Design
//!
//! - Calls are a closed enum matched exhaustively; [`Syscall::None`] is
//!   the explicit ignored default for an unrecognized request
//! - A system call arrives through the trap path: the thread records its
//!   parameter block, traps, and the built-in `Syscall` vector handler
//!   dequeues the caller before running the request
//! - A service call is a direct invocation from interrupt context. There
//!   is no calling thread, so `current` is forced empty for its duration;
//!   the reschedule that ends the surrounding interrupt entry restores a
//!   valid thread before any thread code resumes
//! - Results land in the result slot of the same parameter block. A
//!   blocked receive leaves the slot `Pending`; the hand-off writes it
//!   when a matching send arrives

use core::ptr::NonNull;

use log::error;

use crate::err::Result;
use crate::kernel::port::{IntrHandler, SoftVec};
use crate::kernel::thread::{ThreadFn, ThreadId};
use crate::kernel::Kernel;

/// A system-call request.
///
/// Operations that consult the calling thread (everything except Send,
/// KernelAlloc, KernelFree and SetIntrHandler) require a thread context
/// and degrade to no-ops when issued as service calls.
#[derive(Debug, Clone, Copy)]
pub enum Syscall {
    /// Create and admit a new thread.
    Spawn {
        func: ThreadFn,
        name: &'static str,
        priority: usize,
        stack_size: usize,
        argc: i32,
        argv: *mut *mut u8,
    },
    /// Terminate the calling thread.
    Exit,
    /// Yield the rest of the caller's turn at its priority level.
    Wait,
    /// Leave the ready queue until another thread wakes the caller.
    Sleep,
    /// Re-admit the given thread.
    Wakeup { id: ThreadId },
    /// Identity of the calling thread.
    GetId,
    /// Change the caller's priority; negative queries without changing.
    ChangePriority { priority: i32 },
    /// Allocate from the kernel allocator.
    KernelAlloc { size: usize },
    /// Release a kernel allocation.
    KernelFree { ptr: *mut u8 },
    /// Post a message. Never blocks the sender.
    Send {
        mailbox: usize,
        size: usize,
        payload: *mut u8,
    },
    /// Receive a message. Blocks while the mailbox is empty.
    Recv { mailbox: usize },
    /// Register a kernel-level interrupt handler for a vector.
    SetIntrHandler {
        vector: SoftVec,
        handler: IntrHandler,
    },
    /// No request. The dispatcher ignores it.
    None,
}

/// The result slot of a parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    /// Not written yet: the call is still parked (blocked receive) or was
    /// skipped for lack of a calling thread.
    Pending,
    /// Completed with nothing to report.
    Done,
    /// Spawn outcome.
    Thread(Result<ThreadId>),
    /// A thread identity.
    Id(ThreadId),
    /// The previous priority.
    Priority(usize),
    /// Allocated memory; null when the allocator is exhausted.
    Memory(*mut u8),
    /// Bytes accepted by Send.
    Sent(usize),
    /// A delivered message. The sender is unset when the message came
    /// from a service call with no thread context.
    Received {
        sender: Option<ThreadId>,
        size: usize,
        payload: *mut u8,
    },
}

/// A fixed call parameter block: the request and its result slot.
#[derive(Debug, Clone, Copy)]
pub struct SyscallBlock {
    pub call: Syscall,
    pub result: SyscallResult,
}

impl SyscallBlock {
    pub fn new(call: Syscall) -> Self {
        Self {
            call,
            result: SyscallResult::Pending,
        }
    }
}

impl Kernel {
    /// Record `block` as the caller's pending request. The platform trap
    /// carries it into the dispatcher; the block must stay alive until the
    /// call completes (a parked receive holds onto it).
    pub fn syscall_request(&mut self, block: NonNull<SyscallBlock>) {
        let Some(cur) = self.current else {
            return;
        };
        self.threads[cur].pending = Some(block);
    }

    /// Direct call path for interrupt handlers.
    ///
    /// Several operations consult the calling thread through `current`;
    /// with no real caller here, `current` is cleared so they cannot
    /// misattribute the request. Only operations that tolerate the absent
    /// caller may be issued this way (message send on behalf of a driver,
    /// not "get my own id").
    pub fn service_call(&mut self, block: &mut SyscallBlock) {
        self.current = None;
        self.execute(NonNull::from(block));
    }

    /// The shared call-execution core.
    pub(crate) fn execute(&mut self, block: NonNull<SyscallBlock>) {
        let call = unsafe { block.as_ref().call };
        let result = match call {
            Syscall::Spawn {
                func,
                name,
                priority,
                stack_size,
                argc,
                argv,
            } => SyscallResult::Thread(self.spawn(func, name, priority, stack_size, argc, argv)),
            Syscall::Exit => self.exit_current(),
            Syscall::Wait => self.wait(),
            Syscall::Sleep => self.sleep(),
            Syscall::Wakeup { id } => self.wakeup(id),
            Syscall::GetId => self.current_id(),
            Syscall::ChangePriority { priority } => self.change_priority(priority),
            Syscall::KernelAlloc { size } => self.kmalloc(size),
            Syscall::KernelFree { ptr } => self.kmfree(ptr),
            Syscall::Send {
                mailbox,
                size,
                payload,
            } => self.send(mailbox, size, payload),
            Syscall::Recv { mailbox } => self.recv(mailbox),
            Syscall::SetIntrHandler { vector, handler } => {
                self.set_intr_handler(vector, handler)
            }
            // An unrecognized request is ignored, not failed; the caller
            // keeps running and its result slot stays untouched.
            Syscall::None => {
                self.put_current();
                SyscallResult::Pending
            }
        };

        if !matches!(result, SyscallResult::Pending) {
            // A pending result means the call has not completed; leave the
            // caller's slot untouched for a later hand-off to fill.
            unsafe { (*block.as_ptr()).result = result };
        }
    }

    /// Call core for SetIntrHandler. The platform's low-level vector table
    /// already routes every vector to the interrupt entry shim, so
    /// registration is purely a kernel-table update.
    pub(crate) fn set_intr_handler(
        &mut self,
        vector: SoftVec,
        handler: IntrHandler,
    ) -> SyscallResult {
        self.handlers[vector as usize] = Some(handler);
        self.put_current();
        SyscallResult::Done
    }
}

/// Built-in handler for the system-call trap: dequeue the caller and run
/// its pending request.
pub(crate) fn syscall_intr(k: &mut Kernel) {
    let Some(cur) = k.current else {
        return;
    };
    let Some(block) = k.threads[cur].pending else {
        return;
    };
    k.take_current();
    k.execute(block);
}

/// Built-in handler for the software-error trap: log the offender and
/// force-exit it.
pub(crate) fn softerr_intr(k: &mut Kernel) {
    if let Some(cur) = k.current {
        error!("{}: DOWN", k.threads[cur].name());
    }
    k.take_current();
    k.exit_current();
}
