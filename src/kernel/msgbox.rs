// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Mailbox Message Passing
//!
//! # Design
//!
//! - Fixed table of mailboxes addressed by index; each holds a FIFO of
//!   heap-allocated message nodes and at most one waiting receiver
//! - Send never blocks: the message is queued unconditionally, and if a
//!   receiver is parked the pair is matched on the spot
//! - Receive blocks while the mailbox is empty by leaving the caller off
//!   the ready queue; the matching send completes the parked call by
//!   writing through the receiver's retained parameter block
//! - A second thread receiving on an occupied mailbox is a protocol
//!   violation and halts the system

use core::mem;
use core::ptr;

use log::trace;

use crate::kernel::syscall::SyscallResult;
use crate::kernel::thread::ThreadId;
use crate::kernel::{down, Kernel, MSGBOX_COUNT};

/// One queued message. Nodes come from the platform allocator and are
/// released on delivery; the payload pointer passes through untouched.
struct MsgNode {
    next: *mut MsgNode,
    /// Unset when the message was posted by a service call.
    sender: Option<ThreadId>,
    size: usize,
    payload: *mut u8,
}

/// A mailbox: a message FIFO plus the one thread allowed to wait on it.
pub struct MsgBox {
    pub(crate) receiver: Option<usize>,
    head: *mut MsgNode,
    tail: *mut MsgNode,
}

impl MsgBox {
    pub(crate) const EMPTY: MsgBox = MsgBox {
        receiver: None,
        head: ptr::null_mut(),
        tail: ptr::null_mut(),
    };

    fn is_empty(&self) -> bool {
        self.head.is_null()
    }
}

impl Kernel {
    /// Call core for Send: queue the message, and if a receiver is parked
    /// on the mailbox complete its receive immediately. The sender is
    /// re-admitted first and never blocks.
    pub(crate) fn send(&mut self, mailbox: usize, size: usize, payload: *mut u8) -> SyscallResult {
        if mailbox >= MSGBOX_COUNT {
            down("mailbox id out of range");
        }

        let sender = self.current.map(ThreadId);
        self.put_current();
        self.append_msg(mailbox, sender, size, payload);

        // Hand off to a parked receiver: it briefly becomes current so the
        // delivery and re-admission read exactly like its own receive path.
        if let Some(receiver) = self.msgboxes[mailbox].receiver {
            self.current = Some(receiver);
            self.deliver_msg(mailbox);
            self.put_current();
        }
        SyscallResult::Sent(size)
    }

    /// Call core for Recv: take the oldest queued message, or park the
    /// caller until one arrives. Only one receiver may wait per mailbox.
    pub(crate) fn recv(&mut self, mailbox: usize) -> SyscallResult {
        if mailbox >= MSGBOX_COUNT {
            down("mailbox id out of range");
        }
        let Some(cur) = self.current else {
            return SyscallResult::Pending;
        };

        if self.msgboxes[mailbox].receiver.is_some() {
            down("mailbox already has a receiver");
        }
        self.msgboxes[mailbox].receiver = Some(cur);

        if self.msgboxes[mailbox].is_empty() {
            // Blocked: stay off the ready queue, keep the parameter block
            // parked. The matching send finishes the call.
            trace!("recv: {} parked on mbox {}", self.threads[cur].name(), mailbox);
            return SyscallResult::Pending;
        }

        // A message is already waiting; deliver it and keep running. The
        // delivery wrote the result, so there is nothing left to report.
        self.deliver_msg(mailbox);
        self.put_current();
        SyscallResult::Pending
    }

    /// Append a message node to the mailbox FIFO. Node-allocation failure
    /// is fatal; messages must not be dropped silently.
    fn append_msg(&mut self, mailbox: usize, sender: Option<ThreadId>, size: usize, payload: *mut u8) {
        let raw = (self.port.alloc)(mem::size_of::<MsgNode>());
        if raw.is_null() {
            down("message buffer allocation failed");
        }
        let node = raw as *mut MsgNode;
        // SAFETY: the allocator contract guarantees a word-aligned block of
        // at least the requested size, exclusively ours.
        unsafe {
            node.write(MsgNode {
                next: ptr::null_mut(),
                sender,
                size,
                payload,
            });
        }

        let mb = &mut self.msgboxes[mailbox];
        if mb.tail.is_null() {
            mb.head = node;
        } else {
            // SAFETY: a non-null tail is a live node queued by this table.
            unsafe { (*mb.tail).next = node };
        }
        mb.tail = node;
        trace!("send: {}B queued on mbox {}", size, mailbox);
    }

    /// Unlink the oldest message and complete the mailbox's receiver with
    /// it. The node is returned to the allocator; the receiver slot is
    /// cleared for the next waiter.
    fn deliver_msg(&mut self, mailbox: usize) {
        let (receiver, node, sender, size, payload) = {
            let mb = &mut self.msgboxes[mailbox];
            let Some(receiver) = mb.receiver.take() else {
                return;
            };
            let node = mb.head;
            debug_assert!(!node.is_null());
            // SAFETY: a non-empty mailbox's head is a live node.
            unsafe {
                mb.head = (*node).next;
                if mb.head.is_null() {
                    mb.tail = ptr::null_mut();
                }
                (receiver, node, (*node).sender, (*node).size, (*node).payload)
            }
        };
        (self.port.free)(node as *mut u8);

        let Some(block) = self.threads[receiver].pending else {
            down("receive hand-off with no pending call");
        };
        // SAFETY: a parked receiver's parameter block stays alive until its
        // call completes, which is now.
        unsafe {
            (*block.as_ptr()).result = SyscallResult::Received {
                sender,
                size,
                payload,
            };
        }
        trace!(
            "recv: {} took {}B from mbox {}",
            self.threads[receiver].name(),
            size,
            mailbox
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::syscall::{Syscall, SyscallBlock};
    use crate::kernel::tests::harness::*;

    #[test]
    fn queued_messages_are_received_in_fifo_order() {
        let mut k = kernel();
        let idle = boot(&mut k);
        let mut m1 = *b"first";
        let mut m2 = *b"second";
        let mut m3 = *b"third";

        for (size, payload) in [
            (m1.len(), m1.as_mut_ptr()),
            (m2.len(), m2.as_mut_ptr()),
            (m3.len(), m3.as_mut_ptr()),
        ] {
            let result = run_syscall(
                &mut k,
                Syscall::Send {
                    mailbox: 0,
                    size,
                    payload,
                },
            );
            assert_eq!(result, SyscallResult::Sent(size));
            // The sender keeps running.
            assert_eq!(k.current_thread(), Some(idle));
        }

        for (size, payload) in [
            (m1.len(), m1.as_mut_ptr()),
            (m2.len(), m2.as_mut_ptr()),
            (m3.len(), m3.as_mut_ptr()),
        ] {
            let mut block = SyscallBlock::new(Syscall::Recv { mailbox: 0 });
            drive_syscall(&mut k, &mut block);
            assert_eq!(
                block.result,
                SyscallResult::Received {
                    sender: Some(idle),
                    size,
                    payload,
                }
            );
        }
    }

    #[test]
    fn send_completes_a_parked_receiver() {
        let mut k = kernel();
        let idle = boot(&mut k);
        let rx = spawn(&mut k, "rx", 2).unwrap();
        run_syscall(&mut k, Syscall::ChangePriority { priority: 15 });
        assert_eq!(k.current_thread(), Some(rx));

        // The receiver parks on an empty mailbox; the idle thread runs.
        let mut recv = SyscallBlock::new(Syscall::Recv { mailbox: 1 });
        drive_syscall(&mut k, &mut recv);
        assert_eq!(recv.result, SyscallResult::Pending);
        assert_eq!(k.current_thread(), Some(idle));
        assert_ready_invariant(&k);

        // The send wakes the receiver, which preempts the idle sender.
        let mut payload = *b"ping";
        let sent = run_syscall(
            &mut k,
            Syscall::Send {
                mailbox: 1,
                size: payload.len(),
                payload: payload.as_mut_ptr(),
            },
        );
        assert_eq!(sent, SyscallResult::Sent(4));
        assert_eq!(
            recv.result,
            SyscallResult::Received {
                sender: Some(idle),
                size: 4,
                payload: payload.as_mut_ptr(),
            }
        );
        assert_eq!(k.current_thread(), Some(rx));
        assert_ready_invariant(&k);
    }

    #[test]
    fn receiver_slot_clears_after_each_delivery() {
        let mut k = kernel();
        boot(&mut k);
        let mut payload = *b"x";

        // Park, deliver, then park again on the same mailbox; the second
        // receive must not trip the single-receiver check.
        for _ in 0..2 {
            run_syscall(
                &mut k,
                Syscall::Send {
                    mailbox: 3,
                    size: payload.len(),
                    payload: payload.as_mut_ptr(),
                },
            );
            let mut block = SyscallBlock::new(Syscall::Recv { mailbox: 3 });
            drive_syscall(&mut k, &mut block);
            assert!(matches!(block.result, SyscallResult::Received { .. }));
            assert_eq!(k.msgboxes[3].receiver, None);
        }
    }

    #[test]
    #[should_panic(expected = "mailbox already has a receiver")]
    fn second_receiver_on_a_mailbox_is_fatal() {
        let mut k = kernel();
        boot(&mut k);
        spawn(&mut k, "r1", 2).unwrap();
        spawn(&mut k, "r2", 3).unwrap();
        run_syscall(&mut k, Syscall::ChangePriority { priority: 15 });

        // r1 parks on the mailbox, then r2 tries the same one.
        let mut first = SyscallBlock::new(Syscall::Recv { mailbox: 4 });
        drive_syscall(&mut k, &mut first);
        let mut second = SyscallBlock::new(Syscall::Recv { mailbox: 4 });
        drive_syscall(&mut k, &mut second);
    }

    #[test]
    #[should_panic(expected = "mailbox id out of range")]
    fn out_of_range_mailbox_is_fatal() {
        let mut k = kernel();
        boot(&mut k);
        run_syscall(
            &mut k,
            Syscall::Send {
                mailbox: MSGBOX_COUNT,
                size: 0,
                payload: core::ptr::null_mut(),
            },
        );
    }
}
