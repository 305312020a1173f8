// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! External Collaborator Contracts
//!
//! The kernel core is architecture-neutral; everything that touches
//! hardware lives behind the contracts in this module.
//!
//! # Collaborators
//!
//! - **Context-switch primitive**: `resume(sp)` restores a full register
//!   set from the image at `sp` and transfers control to it; it never
//!   returns. The kernel's obligation is to keep saved contexts in the
//!   layout `kernel::context` produces.
//! - **Vector table**: the platform routes every software interrupt in
//!   [`SoftVec`] to `kernel::interrupt` with the interrupted thread's
//!   captured stack pointer, then resumes the returned context.
//! - **Allocator**: backs message-buffer nodes and the KernelAlloc call;
//!   the kernel never looks inside it.

use crate::kernel::Kernel;

/// Software interrupt vectors understood by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SoftVec {
    /// Software error trap (illegal instruction, address error, ...).
    SoftErr = 0,
    /// System-call trap.
    Syscall = 1,
    /// Serial interrupt; the console driver claims this one through
    /// SetIntrHandler.
    Serial = 2,
}

impl SoftVec {
    /// Number of vectors.
    pub const COUNT: usize = 3;
}

/// A kernel-level interrupt handler, registered per vector.
///
/// Handlers run inside the interrupt entry shim and may issue service
/// calls through [`Kernel::service_call`].
pub type IntrHandler = fn(&mut Kernel);

/// Collaborator functions supplied by the surrounding platform layer.
#[derive(Clone, Copy)]
pub struct Port {
    /// Word-aligned allocator; returns null when exhausted. A null result
    /// during message-node creation is fatal.
    pub alloc: fn(usize) -> *mut u8,
    /// Release a block obtained from `alloc`.
    pub free: fn(*mut u8),
    /// Trigger the system-call trap (e.g. `trapa #0`).
    pub trap: fn(),
}
