//! Checkpoint identifiers.
//!
//! Every checkpoint owns one bit in the registry's enabled bitmask. The
//! fixed lifecycle points come first, followed by an enter/exit pair for
//! each syscall number.

use std::fmt;

use seccheck_common::constants::{POINTS_BEFORE_SYSCALLS, SYSCALL_POINTS};

/// Number of checkpoints, and therefore bits, in the enabled bitmask.
pub const POINT_COUNT: usize = POINTS_BEFORE_SYSCALLS + 2 * SYSCALL_POINTS;

/// Number of 32-bit words holding the enabled bitmask.
pub(crate) const BITMASK_WORDS: usize = (POINT_COUNT - 1) / 32 + 1;

/// A point at which a security check occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Point {
    /// A task creates another task.
    Clone,
    /// A task executes a new program.
    Execve,
    /// An exiting task notifies its parent.
    ExitNotifyParent,
    /// A container's init process starts.
    ContainerStart,
    /// Entry to the syscall with the given number.
    SyscallEnter(u32),
    /// Exit from the syscall with the given number.
    SyscallExit(u32),
}

impl Point {
    /// Enter or exit point for `sysno`.
    #[must_use]
    pub const fn syscall(sysno: u32, exit: bool) -> Self {
        if exit {
            Self::SyscallExit(sysno)
        } else {
            Self::SyscallEnter(sysno)
        }
    }

    /// Bit position of this point, or `None` for syscall numbers outside
    /// the covered range.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        let index = match self {
            Self::Clone => 0,
            Self::Execve => 1,
            Self::ExitNotifyParent => 2,
            Self::ContainerStart => 3,
            Self::SyscallEnter(n) => POINTS_BEFORE_SYSCALLS + 2 * n as usize,
            Self::SyscallExit(n) => POINTS_BEFORE_SYSCALLS + 2 * n as usize + 1,
        };
        if index < POINT_COUNT { Some(index) } else { None }
    }

    /// Inverse of [`Point::index`].
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Clone),
            1 => Some(Self::Execve),
            2 => Some(Self::ExitNotifyParent),
            3 => Some(Self::ContainerStart),
            i if i < POINT_COUNT => {
                let offset = i - POINTS_BEFORE_SYSCALLS;
                #[allow(clippy::cast_possible_truncation)]
                let sysno = (offset / 2) as u32;
                Some(Self::syscall(sysno, offset % 2 == 1))
            }
            _ => None,
        }
    }

    /// Word and bit mask locating this point in the enabled bitmask.
    pub(crate) const fn bit(self) -> Option<(usize, u32)> {
        match self.index() {
            Some(i) => Some((i / 32, 1 << (i % 32))),
            None => None,
        }
    }

    /// Whether this point fires after the checked operation completed.
    #[must_use]
    pub const fn is_exit(self) -> bool {
        matches!(self, Self::SyscallExit(_))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clone => write!(f, "clone"),
            Self::Execve => write!(f, "execve"),
            Self::ExitNotifyParent => write!(f, "exit_notify_parent"),
            Self::ContainerStart => write!(f, "container_start"),
            Self::SyscallEnter(n) => write!(f, "syscall/{n}/enter"),
            Self::SyscallExit(n) => write!(f, "syscall/{n}/exit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn indices_are_a_bijection() {
        let mut seen = HashSet::new();
        for index in 0..POINT_COUNT {
            let point = Point::from_index(index).expect("in range");
            assert_eq!(point.index(), Some(index));
            assert!(seen.insert(point), "{point} mapped twice");
        }
        assert_eq!(Point::from_index(POINT_COUNT), None);
    }

    #[test]
    fn syscall_points_interleave_enter_and_exit() {
        assert_eq!(Point::SyscallEnter(0).index(), Some(4));
        assert_eq!(Point::SyscallExit(0).index(), Some(5));
        assert_eq!(Point::SyscallEnter(2).index(), Some(8));
        assert!(Point::SyscallExit(2).is_exit());
    }

    #[test]
    fn out_of_range_syscalls_have_no_bit() {
        let sysno = u32::try_from(SYSCALL_POINTS).expect("fits");
        assert_eq!(Point::SyscallEnter(sysno).bit(), None);
        assert!(Point::SyscallExit(sysno - 1).bit().is_some());
    }

    #[test]
    fn bitmask_covers_every_point() {
        let (word, _) = Point::SyscallExit(u32::try_from(SYSCALL_POINTS - 1).expect("fits"))
            .bit()
            .expect("last point");
        assert_eq!(word, BITMASK_WORDS - 1);
    }
}
