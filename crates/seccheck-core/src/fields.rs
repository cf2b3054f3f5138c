//! Field-set algebra.
//!
//! A [`FieldSet`] names the optional members of one checkpoint kind's event
//! that are populated (at the call site) or requested (by a checker). The
//! registry keeps the union of every registered checker's requests in an
//! [`AtomicFieldSet`] so call sites can skip computing fields nobody asked for.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU32, Ordering};

/// An optional event member, identified by its bit.
pub trait Field: Copy {
    /// Single-bit mask for this field.
    fn mask(self) -> u32;
}

macro_rules! fields {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl Field for $name {
            fn mask(self) -> u32 {
                1 << (self as u32)
            }
        }
    };
}

fields!(
    /// Optional members of [`CloneInfo`](crate::info::CloneInfo).
    CloneField {
        /// Invoking task identifiers.
        Invoker,
        /// Invoking task credentials.
        Credentials,
        /// Clone flags.
        Args,
        /// Created task identifiers.
        Created,
    }
);

fields!(
    /// Optional members of [`ExecveInfo`](crate::info::ExecveInfo).
    ExecveField {
        /// Invoking task identifiers.
        Invoker,
        /// Invoking task credentials.
        Credentials,
        /// Path of the executed binary.
        BinaryPath,
        /// Argument vector.
        Argv,
        /// Environment.
        Env,
        /// Mode, owner and group of the binary.
        BinaryMode,
        /// SHA-256 digest of the binary.
        BinarySha256,
    }
);

fields!(
    /// Optional members of [`ExitNotifyParentInfo`](crate::info::ExitNotifyParentInfo).
    ExitNotifyParentField {
        /// Exiting task identifiers.
        Exiter,
        /// Exit status.
        ExitStatus,
    }
);

fields!(
    /// Optional members of syscall events.
    SyscallField {
        /// Raw argument registers of generic syscall events.
        RawArgs,
        /// Path backing a file descriptor argument.
        FdPath,
    }
);

fields!(
    /// Optional members of container start events.
    ContainerStartField {
        /// Environment of the init process.
        Env,
    }
);

/// A set of fields of one event kind.
pub struct FieldSet<F> {
    bits: u32,
    _kind: PhantomData<fn() -> F>,
}

/// Fields of clone events.
pub type CloneFieldSet = FieldSet<CloneField>;
/// Fields of execve events.
pub type ExecveFieldSet = FieldSet<ExecveField>;
/// Fields of exit-notify-parent events.
pub type ExitNotifyParentFieldSet = FieldSet<ExitNotifyParentField>;
/// Fields of syscall events.
pub type SyscallFieldSet = FieldSet<SyscallField>;
/// Fields of container start events.
pub type ContainerStartFieldSet = FieldSet<ContainerStartField>;

impl<F> FieldSet<F> {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self::from_bits(0)
    }

    const fn from_bits(bits: u32) -> Self {
        Self {
            bits,
            _kind: PhantomData,
        }
    }

    /// Whether no field is in the set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Fields in either set.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self::from_bits(self.bits | other.bits)
    }

    /// Whether every field of `other` is also in `self`.
    #[must_use]
    pub const fn is_superset(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl<F: Field> FieldSet<F> {
    /// Set holding exactly `fields`.
    #[must_use]
    pub fn of(fields: &[F]) -> Self {
        fields.iter().fold(Self::empty(), |set, &f| set.with(f))
    }

    /// This set plus `field`.
    #[must_use]
    pub fn with(self, field: F) -> Self {
        Self::from_bits(self.bits | field.mask())
    }

    /// This set minus `field`.
    #[must_use]
    pub fn without(self, field: F) -> Self {
        Self::from_bits(self.bits & !field.mask())
    }

    /// Whether `field` is in the set.
    #[must_use]
    pub fn contains(self, field: F) -> bool {
        self.bits & field.mask() != 0
    }
}

impl<F> Clone for FieldSet<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for FieldSet<F> {}

impl<F> PartialEq for FieldSet<F> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<F> Eq for FieldSet<F> {}

impl<F> Default for FieldSet<F> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<F> fmt::Debug for FieldSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldSet({:#b})", self.bits)
    }
}

impl<F> BitOr for FieldSet<F> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl<F> BitOrAssign for FieldSet<F> {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl<F: Field> From<F> for FieldSet<F> {
    fn from(field: F) -> Self {
        Self::empty().with(field)
    }
}

/// A [`FieldSet`] that grows concurrently with lock-free loads.
pub struct AtomicFieldSet<F> {
    bits: AtomicU32,
    _kind: PhantomData<fn() -> F>,
}

impl<F> AtomicFieldSet<F> {
    /// An empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            _kind: PhantomData,
        }
    }

    /// Current contents.
    pub fn load(&self) -> FieldSet<F> {
        FieldSet::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Adds every field of `set`. Fields are never removed.
    pub fn add(&self, set: FieldSet<F>) {
        let _ = self.bits.fetch_or(set.bits, Ordering::AcqRel);
    }
}

impl<F> Default for AtomicFieldSet<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for AtomicFieldSet<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}
