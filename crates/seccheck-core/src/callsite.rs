//! Helpers invoked from instrumented syscall and lifecycle paths.
//!
//! Each helper checks the point first and returns immediately when no
//! checker enabled it, so callers can invoke them unconditionally. Optional
//! fields are computed through the supplied closures only when some checker
//! requested them. Copying arguments out of the task is the caller's job.

use seccheck_common::error::Result;
use seccheck_wire::messages::{Open, Read, Start, Syscall};

use crate::checker::TaskContext;
use crate::fields::{
    CloneFieldSet, ContainerStartField, ExecveFieldSet, ExitNotifyParentFieldSet, SyscallField,
};
use crate::info::{CloneInfo, ExecveInfo, ExitNotifyParentInfo, Outcome};
use crate::point::Point;
use crate::registry::Registry;

/// Checks an `open(2)` family syscall on entry.
///
/// # Errors
///
/// Returns the first checker veto.
pub fn open_enter(registry: &Registry, ctx: &TaskContext, sysno: u32, info: Open) -> Result<()> {
    open(registry, ctx, sysno, info, None)
}

/// Checks an `open(2)` family syscall on exit.
///
/// # Errors
///
/// Returns the first checker veto.
pub fn open_exit(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    info: Open,
    outcome: Outcome,
) -> Result<()> {
    open(registry, ctx, sysno, info, Some(outcome))
}

fn open(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    mut info: Open,
    outcome: Option<Outcome>,
) -> Result<()> {
    let point = Point::syscall(sysno, outcome.is_some());
    if !registry.enabled(point) {
        return Ok(());
    }
    info.exit = outcome.map(Into::into);
    let mask = registry.syscall_fields();
    registry.dispatch(point, |c| c.open(ctx, mask, &info))
}

/// Checks `read(2)` on entry. `fd_path` resolves the descriptor's path and
/// is only called when a checker requested [`SyscallField::FdPath`].
///
/// # Errors
///
/// Returns the first checker veto.
pub fn read_enter(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    info: Read,
    fd_path: impl FnOnce(i64) -> Option<String>,
) -> Result<()> {
    read(registry, ctx, sysno, info, fd_path, None)
}

/// Checks `read(2)` on exit.
///
/// # Errors
///
/// Returns the first checker veto.
pub fn read_exit(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    info: Read,
    fd_path: impl FnOnce(i64) -> Option<String>,
    outcome: Outcome,
) -> Result<()> {
    read(registry, ctx, sysno, info, fd_path, Some(outcome))
}

fn read(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    mut info: Read,
    fd_path: impl FnOnce(i64) -> Option<String>,
    outcome: Option<Outcome>,
) -> Result<()> {
    let point = Point::syscall(sysno, outcome.is_some());
    if !registry.enabled(point) {
        return Ok(());
    }
    let mask = registry.syscall_fields();
    let mut populated = mask;
    if mask.contains(SyscallField::FdPath) {
        match fd_path(info.fd) {
            Some(path) => info.fd_path = path,
            None => populated = mask.without(SyscallField::FdPath),
        }
    }
    info.exit = outcome.map(Into::into);
    registry.dispatch(point, |c| c.read(ctx, populated, &info))
}

/// Checks a syscall without a dedicated event on entry.
///
/// # Errors
///
/// Returns the first checker veto.
pub fn syscall_enter(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    args: [u64; 6],
) -> Result<()> {
    syscall(registry, ctx, sysno, args, None)
}

/// Checks a syscall without a dedicated event on exit.
///
/// # Errors
///
/// Returns the first checker veto.
pub fn syscall_exit(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    args: [u64; 6],
    outcome: Outcome,
) -> Result<()> {
    syscall(registry, ctx, sysno, args, Some(outcome))
}

fn syscall(
    registry: &Registry,
    ctx: &TaskContext,
    sysno: u32,
    args: [u64; 6],
    outcome: Option<Outcome>,
) -> Result<()> {
    let point = Point::syscall(sysno, outcome.is_some());
    if !registry.enabled(point) {
        return Ok(());
    }
    let mask = registry.syscall_fields();
    let args = if mask.contains(SyscallField::RawArgs) { args } else { [0; 6] };
    let mut info = Syscall::new(u64::from(sysno), args);
    info.exit = outcome.map(Into::into);
    registry.dispatch(point, |c| c.syscall(ctx, mask, &info))
}

/// Checks a container start. `env` is only called when a checker requested
/// [`ContainerStartField::Env`].
///
/// # Errors
///
/// Returns the first checker veto.
pub fn container_start(
    registry: &Registry,
    ctx: &TaskContext,
    mut info: Start,
    env: impl FnOnce() -> Vec<String>,
) -> Result<()> {
    if !registry.enabled(Point::ContainerStart) {
        return Ok(());
    }
    let mask = registry.container_start_fields();
    if mask.contains(ContainerStartField::Env) {
        info.env = env();
    }
    registry.dispatch(Point::ContainerStart, |c| c.container_start(ctx, mask, &info))
}

/// Checks task creation. `build` receives the requested fields and returns
/// the event with at least those populated.
///
/// # Errors
///
/// Returns the first checker veto.
pub fn clone_process(
    registry: &Registry,
    ctx: &TaskContext,
    build: impl FnOnce(CloneFieldSet) -> CloneInfo,
) -> Result<()> {
    if !registry.enabled(Point::Clone) {
        return Ok(());
    }
    let mask = registry.clone_fields();
    let info = build(mask);
    registry.dispatch(Point::Clone, |c| c.clone_process(ctx, mask, &info))
}

/// Checks program execution. `build` receives the requested fields.
///
/// # Errors
///
/// Returns the first checker veto.
pub fn execve(
    registry: &Registry,
    ctx: &TaskContext,
    build: impl FnOnce(ExecveFieldSet) -> ExecveInfo,
) -> Result<()> {
    if !registry.enabled(Point::Execve) {
        return Ok(());
    }
    let mask = registry.execve_fields();
    let info = build(mask);
    registry.dispatch(Point::Execve, |c| c.execve(ctx, mask, &info))
}

/// Notifies checkers that a task is exiting. `build` receives the requested fields.
///
/// # Errors
///
/// Returns the first checker error.
pub fn exit_notify_parent(
    registry: &Registry,
    ctx: &TaskContext,
    build: impl FnOnce(ExitNotifyParentFieldSet) -> ExitNotifyParentInfo,
) -> Result<()> {
    if !registry.enabled(Point::ExitNotifyParent) {
        return Ok(());
    }
    let mask = registry.exit_notify_parent_fields();
    let info = build(mask);
    registry.dispatch(Point::ExitNotifyParent, |c| c.exit_notify_parent(ctx, mask, &info))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use libc::EACCES;
    use seccheck_common::error::SeccheckError;

    use super::*;
    use crate::checker::{Checker, CheckerRequest};
    use crate::fields::{CloneField, SyscallFieldSet};

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    const SYS_READ: u32 = libc::SYS_read as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    const SYS_OPEN: u32 = libc::SYS_openat as u32;

    #[derive(Default)]
    struct Capture {
        opens: Mutex<Vec<Open>>,
        reads: Mutex<Vec<(SyscallFieldSet, Read)>>,
        clones: Mutex<Vec<CloneInfo>>,
    }

    impl Checker for Capture {
        fn open(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, info: &Open) -> Result<()> {
            self.opens.lock().unwrap().push(info.clone());
            if info.pathname == "/etc/shadow" {
                return Err(SeccheckError::denied(EACCES, "shadow is off limits"));
            }
            Ok(())
        }

        fn read(&self, _ctx: &TaskContext, mask: SyscallFieldSet, info: &Read) -> Result<()> {
            self.reads.lock().unwrap().push((mask, info.clone()));
            Ok(())
        }

        fn clone_process(
            &self,
            _ctx: &TaskContext,
            _mask: CloneFieldSet,
            info: &CloneInfo,
        ) -> Result<()> {
            self.clones.lock().unwrap().push(info.clone());
            Ok(())
        }
    }

    fn registered(req: &CheckerRequest) -> (Registry, Arc<Capture>) {
        let registry = Registry::new();
        let capture = Arc::new(Capture::default());
        registry.append_checker(Arc::clone(&capture) as Arc<dyn Checker>, req);
        (registry, capture)
    }

    fn open_of(path: &str) -> Open {
        Open {
            pathname: path.into(),
            ..Open::default()
        }
    }

    #[test]
    fn exit_events_carry_the_outcome() {
        let (registry, capture) =
            registered(&CheckerRequest::for_points([Point::SyscallExit(SYS_OPEN)]));
        let ctx = TaskContext::default();

        open_enter(&registry, &ctx, SYS_OPEN, open_of("/tmp/a")).expect("enter");
        open_exit(
            &registry,
            &ctx,
            SYS_OPEN,
            open_of("/tmp/a"),
            Outcome { result: 3, errno: 0 },
        )
        .expect("exit");

        let opens = capture.opens.lock().unwrap();
        assert_eq!(opens.len(), 1, "enter point was not enabled");
        assert_eq!(opens[0].exit.as_ref().map(|e| e.result), Some(3));
    }

    #[test]
    fn veto_is_returned_to_the_call_site() {
        let (registry, _capture) =
            registered(&CheckerRequest::for_points([Point::SyscallEnter(SYS_OPEN)]));
        let err = open_enter(&registry, &TaskContext::default(), SYS_OPEN, open_of("/etc/shadow"))
            .expect_err("denied");
        assert!(matches!(err, SeccheckError::Denied { errno: EACCES, .. }));
    }

    #[test]
    fn fd_path_is_resolved_only_when_requested() {
        let (registry, capture) =
            registered(&CheckerRequest::for_points([Point::SyscallEnter(SYS_READ)]));
        let read = Read {
            fd: 5,
            count: 64,
            ..Read::default()
        };
        read_enter(&registry, &TaskContext::default(), SYS_READ, read, |_| {
            panic!("fd path was not requested")
        })
        .expect("allowed");
        assert!(capture.reads.lock().unwrap()[0].1.fd_path.is_empty());
    }

    #[test]
    fn unresolvable_fd_path_is_dropped_from_the_mask() {
        let (registry, capture) = registered(&CheckerRequest {
            points: vec![Point::SyscallEnter(SYS_READ)],
            syscall: SyscallField::FdPath.into(),
            ..CheckerRequest::default()
        });
        let ctx = TaskContext::default();
        read_enter(&registry, &ctx, SYS_READ, Read { fd: 1, ..Read::default() }, |_| {
            Some("/dev/pts/0".into())
        })
        .expect("allowed");
        read_enter(&registry, &ctx, SYS_READ, Read { fd: 9, ..Read::default() }, |_| None)
            .expect("allowed");

        let reads = capture.reads.lock().unwrap();
        assert!(reads[0].0.contains(SyscallField::FdPath));
        assert_eq!(reads[0].1.fd_path, "/dev/pts/0");
        assert!(!reads[1].0.contains(SyscallField::FdPath));
    }

    #[test]
    fn clone_builder_sees_the_requested_fields() {
        let (registry, capture) = registered(&CheckerRequest {
            points: vec![Point::Clone],
            clone: CloneFieldSet::of(&[CloneField::Invoker, CloneField::Created]),
            ..CheckerRequest::default()
        });
        clone_process(&registry, &TaskContext::default(), |mask| {
            assert!(mask.contains(CloneField::Created));
            assert!(!mask.contains(CloneField::Credentials));
            CloneInfo {
                flags: 0x11,
                ..CloneInfo::default()
            }
        })
        .expect("allowed");
        assert_eq!(capture.clones.lock().unwrap()[0].flags, 0x11);
    }

    #[test]
    fn disabled_points_never_build_events() {
        let registry = Registry::new();
        execve(&registry, &TaskContext::default(), |_| panic!("point is disabled"))
            .expect("no-op");
        container_start(&registry, &TaskContext::default(), Start::default(), || {
            panic!("point is disabled")
        })
        .expect("no-op");
    }
}
