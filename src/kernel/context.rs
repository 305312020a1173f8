// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Stack Arena and Initial Context Images
//!
//! All knowledge of the saved-context layout lives here. To the rest of
//! the kernel a context is a single saved stack-pointer word; the external
//! context-switch primitive consumes the image at that address opaquely.
//!
//! # Design
//!
//! - Per-thread stacks are carved from one shared arena by a monotonic
//!   bump allocator. Regions are never reclaimed, even after the owning
//!   thread exits: the target is a long-running process with a small,
//!   statically bounded thread population, and reuse would change
//!   observable capacity behavior.
//! - A fresh thread's stack is seeded with an image identical to what the
//!   context-switch primitive saves: the start-up trampoline as the resume
//!   address with the interrupt mask merged into the status bits, zeroed
//!   general registers, and the TCB token as the trampoline's argument.

use crate::kernel::down;

/// Size of the shared stack arena, in machine words.
pub const STACK_ARENA_WORDS: usize = 4096;

/// Words in a synthesized initial context image.
pub const FRAME_WORDS: usize = 8;

/// Interrupt-mask bits merged into the saved status/resume word. Priority-0
/// threads carry these, so they run with interrupts disabled; that is the
/// whole of "non-preemptible".
pub const PSW_IRQ_DISABLE: usize = 0xc0 << (usize::BITS - 8);

/// A carved per-thread stack region, as word offsets into the arena.
/// The stack grows downward from `top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    pub(crate) base: usize,
    pub(crate) top: usize,
}

/// The shared stack arena.
pub struct StackArena {
    mem: [usize; STACK_ARENA_WORDS],
    next: usize,
}

impl StackArena {
    pub(crate) const fn new() -> Self {
        Self {
            mem: [0; STACK_ARENA_WORDS],
            next: 0,
        }
    }

    /// Carve `size` bytes (rounded up to whole words) for a new thread.
    /// The region is zeroed; exhausting the arena is fatal.
    pub(crate) fn carve(&mut self, size: usize) -> StackRegion {
        let words = size.div_ceil(core::mem::size_of::<usize>());
        if self.next + words > STACK_ARENA_WORDS {
            down("stack arena exhausted");
        }
        let base = self.next;
        self.next += words;
        for word in &mut self.mem[base..self.next] {
            *word = 0;
        }
        StackRegion {
            base,
            top: self.next,
        }
    }

    /// Seed `region` with an initial context image and return the saved
    /// stack pointer (a word offset into the arena).
    pub(crate) fn init_context(
        &mut self,
        region: StackRegion,
        trampoline: usize,
        priority: usize,
        token: usize,
    ) -> usize {
        let mut sp = region.top;

        // Resume address and saved processor status, as one merged word.
        sp -= 1;
        self.mem[sp] = trampoline
            | if priority == 0 {
                PSW_IRQ_DISABLE
            } else {
                0
            };

        // Six zeroed general registers.
        for _ in 0..6 {
            sp -= 1;
            self.mem[sp] = 0;
        }

        // The trampoline's argument: the token naming the new TCB.
        sp -= 1;
        self.mem[sp] = token;

        sp
    }

    /// Read one saved word; used by the platform resume stub.
    pub fn word(&self, index: usize) -> usize {
        self.mem[index]
    }

    /// Words carved so far. Monotonic for the process lifetime.
    pub fn used(&self) -> usize {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carve_rounds_up_and_bumps() {
        let mut arena = StackArena::new();
        let word = core::mem::size_of::<usize>();

        let a = arena.carve(word * 4);
        assert_eq!((a.base, a.top), (0, 4));

        // One extra byte costs a whole word.
        let b = arena.carve(word * 2 + 1);
        assert_eq!((b.base, b.top), (4, 7));
        assert_eq!(arena.used(), 7);
    }

    #[test]
    fn carve_never_reuses_regions() {
        let mut arena = StackArena::new();
        let a = arena.carve(64);
        let b = arena.carve(64);
        assert!(b.base >= a.top);
        assert!(arena.used() >= b.top);
    }

    #[test]
    #[should_panic(expected = "stack arena exhausted")]
    fn carve_past_arena_end_is_fatal() {
        let mut arena = StackArena::new();
        arena.carve(STACK_ARENA_WORDS * core::mem::size_of::<usize>() + 1);
    }

    #[test]
    fn initial_image_layout() {
        let mut arena = StackArena::new();
        let region = arena.carve(256);
        let trampoline = 0x1234usize;

        let sp = arena.init_context(region, trampoline, 5, 3);
        assert_eq!(sp, region.top - FRAME_WORDS);

        // Argument word, six zeroed registers, then the resume word.
        assert_eq!(arena.word(sp), 3);
        for offset in 1..7 {
            assert_eq!(arena.word(sp + offset), 0);
        }
        assert_eq!(arena.word(sp + 7), trampoline);
    }

    #[test]
    fn priority_zero_disables_interrupts() {
        let mut arena = StackArena::new();
        let region = arena.carve(256);
        let sp = arena.init_context(region, 0x1234, 0, 0);
        assert_eq!(arena.word(sp + 7), 0x1234 | PSW_IRQ_DISABLE);
    }
}
