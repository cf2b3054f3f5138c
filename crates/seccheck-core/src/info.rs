//! In-process event payloads for process lifecycle checkpoints.
//!
//! Which members are meaningful is described by the accompanying field set;
//! members outside it hold their default values.

use seccheck_wire::messages::Exit;

/// Identifiers of a task, as seen from the sandbox root PID namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskInfo {
    /// Thread ID.
    pub thread_id: i32,
    /// Thread group (process) ID.
    pub thread_group_id: i32,
}

/// Task credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Real user ID.
    pub real_uid: u32,
    /// Effective user ID.
    pub effective_uid: u32,
    /// Saved set-user-ID.
    pub saved_uid: u32,
    /// Real group ID.
    pub real_gid: u32,
    /// Effective group ID.
    pub effective_gid: u32,
    /// Saved set-group-ID.
    pub saved_gid: u32,
}

/// Checked at [`Point::Clone`](crate::Point::Clone).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneInfo {
    /// Task calling `clone(2)`.
    pub invoker: TaskInfo,
    /// Credentials of the invoker.
    pub credentials: Credentials,
    /// Clone flags.
    pub flags: u64,
    /// Newly created task.
    pub created: TaskInfo,
}

/// Checked at [`Point::Execve`](crate::Point::Execve).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecveInfo {
    /// Task calling `execve(2)`.
    pub invoker: TaskInfo,
    /// Credentials of the invoker.
    pub credentials: Credentials,
    /// Path of the executed binary.
    pub binary_path: String,
    /// Argument vector.
    pub argv: Vec<String>,
    /// Environment.
    pub env: Vec<String>,
    /// Mode bits of the binary.
    pub binary_mode: u16,
    /// Owner of the binary.
    pub binary_uid: u32,
    /// Group of the binary.
    pub binary_gid: u32,
    /// SHA-256 digest of the binary.
    pub binary_sha256: [u8; 32],
}

/// Checked at [`Point::ExitNotifyParent`](crate::Point::ExitNotifyParent).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitNotifyParentInfo {
    /// Exiting task.
    pub exiter: TaskInfo,
    /// Exit status as reported by `wait(2)`.
    pub exit_status: i32,
}

/// Result of a completed syscall, attached to exit events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Syscall return value.
    pub result: i64,
    /// Error number, zero on success.
    pub errno: i64,
}

impl From<Outcome> for Exit {
    fn from(outcome: Outcome) -> Self {
        Self {
            result: outcome.result,
            errorno: outcome.errno,
        }
    }
}
