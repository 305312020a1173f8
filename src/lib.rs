// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Tinykern - A Tiny Multitasking Kernel Core
//!
//! Tinykern multiplexes one physical execution context across several
//! logical threads on a single-core microcontroller. It provides:
//!
//! - A fixed-capacity thread table with priority-based scheduling
//!   (16 FIFO levels, level 0 highest and non-preemptible)
//! - A trap-driven system-call interface sharing its execution core with
//!   direct service calls from interrupt context
//! - Synchronous mailbox message passing with a non-blocking send and a
//!   blocking receive
//!
//! The architecture-specific pieces stay outside the crate: the boot code,
//! the context-switch primitive, the hardware vector table and the message
//! allocator are collaborators described in [`kernel::port`]. The core only
//! produces and consumes saved-context images through one interface
//! ([`kernel::context`]), so everything else is architecture-neutral.

#![cfg_attr(not(test), no_std)]

pub mod err;
pub mod kernel;

pub use err::Error;
pub use kernel::context::PSW_IRQ_DISABLE;
pub use kernel::port::{IntrHandler, Port, SoftVec};
pub use kernel::syscall::{Syscall, SyscallBlock, SyscallResult};
pub use kernel::thread::{ThreadFn, ThreadId, THREAD_NAME_SIZE};
pub use kernel::{Kernel, MSGBOX_COUNT, PRIORITY_LEVELS, THREAD_MAX};
