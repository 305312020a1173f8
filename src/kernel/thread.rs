// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Table and Lifecycle
//!
//! # Design
//!
//! - Fixed table of [`Tcb`] slots; a slot is free iff its entry function
//!   is unset, and identities are slot indices
//! - Every lifecycle call follows the same shape: the dispatcher dequeues
//!   the caller, the operation re-admits it if it should keep running.
//!   Not re-admitting is how a thread blocks
//! - Stacks come from the shared arena and are never reclaimed; an
//!   exiting thread's region stays carved out

use core::ptr::NonNull;

use bitflags::bitflags;
use log::{debug, info};

use crate::err::{Error, Result};
use crate::kernel::syscall::{Syscall, SyscallBlock, SyscallResult};
use crate::kernel::{down, Kernel, PRIORITY_LEVELS};

/// A thread entry function: `fn(argc, argv) -> status`.
pub type ThreadFn = fn(i32, *mut *mut u8) -> i32;

/// Maximum thread-name length, in bytes.
pub const THREAD_NAME_SIZE: usize = 15;

/// Opaque thread identity. Backed by the TCB slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadId(pub(crate) usize);

impl ThreadId {
    /// The table slot backing this identity.
    pub fn index(self) -> usize {
        self.0
    }
}

bitflags! {
    /// Per-thread flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadFlags: u32 {
        /// The thread is linked into its ready-queue level. Must agree
        /// with the queue structure at all times.
        const READY = 1 << 0;
    }
}

/// Start-up parameters, consumed when the thread first runs.
#[derive(Clone, Copy)]
pub(crate) struct ThreadInit {
    pub(crate) func: Option<ThreadFn>,
    pub(crate) argc: i32,
    pub(crate) argv: *mut *mut u8,
}

/// Thread control block.
pub struct Tcb {
    /// Ready-queue link; owned by the level list the thread is on.
    pub(crate) next: Option<usize>,
    pub(crate) name: [u8; THREAD_NAME_SIZE],
    pub(crate) name_len: usize,
    pub(crate) priority: usize,
    pub(crate) flags: ThreadFlags,
    pub(crate) init: ThreadInit,
    /// Pending system call, recorded by the trap path and consumed by the
    /// dispatcher. Stays valid while a receive is parked.
    pub(crate) pending: Option<NonNull<SyscallBlock>>,
    /// Saved context: the stack pointer. The rest of the register set
    /// lives in the image on the thread's own stack.
    sp: usize,
}

impl Tcb {
    /// The free-slot state.
    pub(crate) const FREE: Tcb = Tcb {
        next: None,
        name: [0; THREAD_NAME_SIZE],
        name_len: 0,
        priority: 0,
        flags: ThreadFlags::empty(),
        init: ThreadInit {
            func: None,
            argc: 0,
            argv: core::ptr::null_mut(),
        },
        pending: None,
        sp: 0,
    };

    pub(crate) fn is_free(&self) -> bool {
        self.init.func.is_none()
    }

    /// Thread name, for diagnostics.
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("?")
    }

    fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(THREAD_NAME_SIZE);
        self.name[..len].copy_from_slice(&bytes[..len]);
        self.name_len = len;
    }

    pub(crate) fn context_sp(&self) -> usize {
        self.sp
    }

    pub(crate) fn set_context_sp(&mut self, sp: usize) {
        self.sp = sp;
    }
}

impl Kernel {
    /// Call core for Run: create a thread and admit it at its priority
    /// level. The caller is re-admitted first, so it keeps its FIFO
    /// position ahead of the new thread.
    pub(crate) fn spawn(
        &mut self,
        func: ThreadFn,
        name: &str,
        priority: usize,
        stack_size: usize,
        argc: i32,
        argv: *mut *mut u8,
    ) -> Result<ThreadId> {
        if priority >= PRIORITY_LEVELS {
            down("thread priority out of range");
        }
        self.put_current();

        let Some(idx) = self.threads.iter().position(Tcb::is_free) else {
            debug!("spawn {:?}: thread table full", name);
            return Err(Error::NoSlot);
        };

        let region = self.arena.carve(stack_size);
        let sp = self
            .arena
            .init_context(region, thread_start as usize, priority, idx);

        let tcb = &mut self.threads[idx];
        *tcb = Tcb::FREE;
        tcb.set_name(name);
        tcb.priority = priority;
        tcb.init = ThreadInit {
            func: Some(func),
            argc,
            argv,
        };
        tcb.sp = sp;

        debug!(
            "spawn {:?} priority={} stack={}B slot={}",
            name, priority, stack_size, idx
        );

        // The new thread becomes current and is admitted immediately.
        self.current = Some(idx);
        self.put_current();
        Ok(ThreadId(idx))
    }

    /// Call core for Exit: release the TCB. The thread leaves scheduling
    /// by never being re-admitted; its stack stays carved from the arena.
    pub(crate) fn exit_current(&mut self) -> SyscallResult {
        let Some(cur) = self.current else {
            return SyscallResult::Pending;
        };
        info!("{}: EXIT", self.threads[cur].name());
        self.threads[cur] = Tcb::FREE;
        self.current = None;
        SyscallResult::Done
    }

    /// Call core for Wait: yield the rest of the caller's turn at its
    /// level by moving to the tail.
    pub(crate) fn wait(&mut self) -> SyscallResult {
        self.put_current();
        match self.current {
            Some(cur) => SyscallResult::Id(ThreadId(cur)),
            None => SyscallResult::Pending,
        }
    }

    /// Call core for Sleep: the caller stays off the ready queue until
    /// some other thread wakes it.
    pub(crate) fn sleep(&mut self) -> SyscallResult {
        SyscallResult::Done
    }

    /// Call core for Wakeup: re-admit the caller, then force-select the
    /// given thread and re-admit it. No check that the target was actually
    /// asleep; the READY flag keeps a double admission harmless.
    pub(crate) fn wakeup(&mut self, id: ThreadId) -> SyscallResult {
        self.put_current();
        self.current = Some(id.0);
        self.put_current();
        SyscallResult::Done
    }

    /// Call core for GetId.
    pub(crate) fn current_id(&mut self) -> SyscallResult {
        self.put_current();
        match self.current {
            Some(cur) => SyscallResult::Id(ThreadId(cur)),
            None => SyscallResult::Pending,
        }
    }

    /// Call core for ChangePriority: returns the previous priority. A
    /// negative request only queries. The new level takes effect with this
    /// re-admission.
    pub(crate) fn change_priority(&mut self, priority: i32) -> SyscallResult {
        let Some(cur) = self.current else {
            return SyscallResult::Pending;
        };
        let old = self.threads[cur].priority;
        if priority >= 0 {
            if priority as usize >= PRIORITY_LEVELS {
                down("thread priority out of range");
            }
            self.threads[cur].priority = priority as usize;
        }
        self.put_current();
        SyscallResult::Priority(old)
    }

    /// Call core for KernelAlloc: pass-through to the external allocator,
    /// with the usual park-and-readmit around it.
    pub(crate) fn kmalloc(&mut self, size: usize) -> SyscallResult {
        self.put_current();
        SyscallResult::Memory((self.port.alloc)(size))
    }

    /// Call core for KernelFree.
    pub(crate) fn kmfree(&mut self, ptr: *mut u8) -> SyscallResult {
        (self.port.free)(ptr);
        self.put_current();
        SyscallResult::Done
    }

    /// Start-up parameters for the trampoline.
    pub(crate) fn init_params(&self, id: ThreadId) -> (ThreadFn, i32, *mut *mut u8) {
        let tcb = &self.threads[id.0];
        match tcb.init.func {
            Some(func) => (func, tcb.init.argc, tcb.init.argv),
            None => down("start-up on a free thread slot"),
        }
    }
}

/// Thread start-up trampoline: the resume target of every fresh context
/// image.
///
/// Invokes the entry function with its recorded arguments and, should it
/// return, leaves through Exit exactly as if the thread had called it.
pub extern "C" fn thread_start(token: usize) -> ! {
    let (func, argc, argv) = crate::kernel::with(|k| k.init_params(ThreadId(token)));
    func(argc, argv);

    let mut block = SyscallBlock::new(Syscall::Exit);
    crate::kernel::syscall(&mut block);

    // The exit trap never schedules this context again.
    loop {
        core::hint::spin_loop();
    }
}
