// Copyright 2026 The Tinykern Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Error Codes
//!
//! Recoverable kernel errors, surfaced to the caller through the result
//! slot of its system-call parameter block. Conditions the kernel cannot
//! continue from do not appear here; those halt the system instead (see
//! `kernel::down`).

use core::fmt;

/// A recoverable kernel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free slot in the thread table.
    NoSlot,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoSlot => write!(f, "thread table full"),
        }
    }
}

/// Kernel operation result.
pub type Result<T> = core::result::Result<T, Error>;
