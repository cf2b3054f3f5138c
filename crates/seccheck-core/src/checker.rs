//! Checker capability trait and registration requests.

use seccheck_common::error::Result;
use seccheck_wire::messages::{Open, Read, Start, Syscall};

use crate::fields::{
    CloneFieldSet, ContainerStartFieldSet, ExecveFieldSet, ExitNotifyParentFieldSet,
    SyscallFieldSet,
};
use crate::info::{CloneInfo, ExecveInfo, ExitNotifyParentInfo};
use crate::point::Point;

/// The task on whose behalf a checkpoint fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskContext {
    /// Thread ID of the current task.
    pub thread_id: i32,
    /// Thread group ID of the current task.
    pub thread_group_id: i32,
    /// Container the task runs in.
    pub container_id: String,
}

/// Performs security checks at checkpoints.
///
/// Each method runs at the checkpoint of the same name. Returning an error
/// fails the checked operation with that error, and no later checker runs.
/// Every method defaults to allowing the operation, so implementors only
/// override the checkpoints they care about.
///
/// `mask` names the members of `info` that are populated. It is normally a
/// superset of what the checker requested, but may miss fields when the
/// checker is registered while the checkpoint is already in flight.
///
/// Checkers run on the instrumented thread: they must not panic and should
/// not block.
pub trait Checker: Send + Sync {
    /// Runs at [`Point::Clone`].
    ///
    /// # Errors
    ///
    /// An error vetoes the clone.
    fn clone_process(
        &self,
        _ctx: &TaskContext,
        _mask: CloneFieldSet,
        _info: &CloneInfo,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs at [`Point::Execve`].
    ///
    /// # Errors
    ///
    /// An error vetoes the exec.
    fn execve(&self, _ctx: &TaskContext, _mask: ExecveFieldSet, _info: &ExecveInfo) -> Result<()> {
        Ok(())
    }

    /// Runs at [`Point::ExitNotifyParent`].
    ///
    /// # Errors
    ///
    /// An error is reported to the call site; the exit itself proceeds.
    fn exit_notify_parent(
        &self,
        _ctx: &TaskContext,
        _mask: ExitNotifyParentFieldSet,
        _info: &ExitNotifyParentInfo,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs at the enter and exit points of the `open(2)` family.
    ///
    /// # Errors
    ///
    /// An error fails the syscall.
    fn open(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, _info: &Open) -> Result<()> {
        Ok(())
    }

    /// Runs at the enter and exit points of `read(2)`.
    ///
    /// # Errors
    ///
    /// An error fails the syscall.
    fn read(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, _info: &Read) -> Result<()> {
        Ok(())
    }

    /// Runs at the enter and exit points of syscalls without a dedicated method.
    ///
    /// # Errors
    ///
    /// An error fails the syscall.
    fn syscall(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, _info: &Syscall) -> Result<()> {
        Ok(())
    }

    /// Runs at [`Point::ContainerStart`].
    ///
    /// # Errors
    ///
    /// An error fails the container start.
    fn container_start(
        &self,
        _ctx: &TaskContext,
        _mask: ContainerStartFieldSet,
        _info: &Start,
    ) -> Result<()> {
        Ok(())
    }
}

/// What checkpoints a checker runs at and what information it needs there.
///
/// Supplied once at registration and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckerRequest {
    /// Checkpoints that must be enabled for this checker. Methods for other
    /// checkpoints may still be called when another checker enabled them.
    pub points: Vec<Point>,
    /// Requested members of [`CloneInfo`].
    pub clone: CloneFieldSet,
    /// Requested members of [`ExecveInfo`].
    pub execve: ExecveFieldSet,
    /// Requested members of [`ExitNotifyParentInfo`].
    pub exit_notify_parent: ExitNotifyParentFieldSet,
    /// Requested members of syscall events.
    pub syscall: SyscallFieldSet,
    /// Requested members of container start events.
    pub container_start: ContainerStartFieldSet,
}

impl CheckerRequest {
    /// A request enabling `points` with no optional fields.
    #[must_use]
    pub fn for_points(points: impl IntoIterator<Item = Point>) -> Self {
        Self {
            points: points.into_iter().collect(),
            ..Self::default()
        }
    }
}
