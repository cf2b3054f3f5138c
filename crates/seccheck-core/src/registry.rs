//! Checkpoint registry.
//!
//! Holds the enabled-point bitmask, the aggregated field requests, and the
//! ordered checker chain. Enablement queries and dispatch never take a lock;
//! registration is serialized by a mutex and only ever appends.
//!
//! Disabling a point or removing a checker is not supported: once set, an
//! enabled bit stays set for the registry's lifetime.
//!
//! Each registration publishes a full copy of the checker list, and every
//! published copy is kept until the registry is dropped. Memory therefore
//! grows quadratically with the number of registrations, which is only
//! acceptable because registration happens a handful of times at startup.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use seccheck_common::error::Result;

use crate::checker::{Checker, CheckerRequest};
use crate::fields::{
    AtomicFieldSet, CloneField, CloneFieldSet, ContainerStartField, ContainerStartFieldSet,
    ExecveField, ExecveFieldSet, ExitNotifyParentField, ExitNotifyParentFieldSet, SyscallField,
    SyscallFieldSet,
};
use crate::point::{BITMASK_WORDS, Point};
use crate::seqcount::SeqCount;

type CheckerList = Vec<Arc<dyn Checker>>;

/// Registered checkers and the checkpoints they enable.
pub struct Registry {
    /// Serializes registrations. Owns every checker list ever published so
    /// a reader's snapshot stays valid for as long as it borrows `self`.
    generations: Mutex<Vec<Arc<CheckerList>>>,

    /// One bit per [`Point`]; set iff some registered checker asked for it.
    enabled: [AtomicU32; BITMASK_WORDS],

    seq: SeqCount,

    /// Current checker list, in execution order. Points into `generations`.
    checkers: AtomicPtr<CheckerList>,

    clone_req: AtomicFieldSet<CloneField>,
    execve_req: AtomicFieldSet<ExecveField>,
    exit_notify_parent_req: AtomicFieldSet<ExitNotifyParentField>,
    syscall_req: AtomicFieldSet<SyscallField>,
    container_start_req: AtomicFieldSet<ContainerStartField>,
}

impl Registry {
    /// Creates a registry with no checkers and every point disabled.
    #[must_use]
    pub fn new() -> Self {
        let initial = Arc::new(CheckerList::new());
        let checkers = AtomicPtr::new(Arc::as_ptr(&initial).cast_mut());
        Self {
            generations: Mutex::new(vec![initial]),
            enabled: [const { AtomicU32::new(0) }; BITMASK_WORDS],
            seq: SeqCount::new(),
            checkers,
            clone_req: AtomicFieldSet::new(),
            execve_req: AtomicFieldSet::new(),
            exit_notify_parent_req: AtomicFieldSet::new(),
            syscall_req: AtomicFieldSet::new(),
            container_start_req: AtomicFieldSet::new(),
        }
    }

    /// Registers `checker` to run after every previously registered checker.
    ///
    /// Field requests are merged before the checker becomes visible, and the
    /// requested points are enabled only after, so a dispatch that sees an
    /// enabled point also sees the checker that enabled it.
    pub fn append_checker(&self, checker: Arc<dyn Checker>, req: &CheckerRequest) {
        let mut generations = self
            .generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.clone_req.add(req.clone);
        self.execve_req.add(req.execve);
        self.exit_notify_parent_req.add(req.exit_notify_parent);
        self.syscall_req.add(req.syscall);
        self.container_start_req.add(req.container_start);

        let mut next = self.checkers().to_vec();
        next.push(checker);
        let next = Arc::new(next);
        let ptr = Arc::as_ptr(&next).cast_mut();
        generations.push(next);
        self.seq.begin_write();
        self.checkers.store(ptr, Ordering::Release);
        self.seq.end_write();

        for &point in &req.points {
            let Some((word, mask)) = point.bit() else {
                tracing::warn!(%point, "checkpoint out of range, not enabled");
                continue;
            };
            let _ = self.enabled[word].fetch_or(mask, Ordering::Release);
        }
        tracing::debug!(
            checkers = generations.len() - 1,
            points = req.points.len(),
            "checker registered"
        );
    }

    /// Whether any registered checker asked for `point`.
    pub fn enabled(&self, point: Point) -> bool {
        point
            .bit()
            .is_some_and(|(word, mask)| self.enabled[word].load(Ordering::Acquire) & mask != 0)
    }

    /// Whether the enter point of syscall `sysno` is enabled.
    pub fn syscall_enter_enabled(&self, sysno: u32) -> bool {
        self.enabled(Point::SyscallEnter(sysno))
    }

    /// Whether the exit point of syscall `sysno` is enabled.
    pub fn syscall_exit_enabled(&self, sysno: u32) -> bool {
        self.enabled(Point::SyscallExit(sysno))
    }

    /// Snapshot of the checker chain in execution order.
    pub fn checkers(&self) -> &[Arc<dyn Checker>] {
        loop {
            let epoch = self.seq.begin_read();
            let ptr = self.checkers.load(Ordering::Acquire);
            if self.seq.read_ok(epoch) {
                // SAFETY: `ptr` was published by `new` or `append_checker` and
                // points into a list owned by `generations`. Lists are never
                // removed or mutated after publication, so the list lives, and
                // stays unchanged, until `self` is dropped.
                return unsafe { &*ptr };
            }
        }
    }

    /// Calls `f` on every checker in registration order, stopping at the
    /// first error.
    ///
    /// Does nothing when `point` is not enabled.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn dispatch<F>(&self, point: Point, mut f: F) -> Result<()>
    where
        F: FnMut(&dyn Checker) -> Result<()>,
    {
        if !self.enabled(point) {
            return Ok(());
        }
        for checker in self.checkers() {
            f(checker.as_ref())?;
        }
        Ok(())
    }

    /// Union of every registered checker's clone field requests.
    pub fn clone_fields(&self) -> CloneFieldSet {
        self.clone_req.load()
    }

    /// Union of every registered checker's execve field requests.
    pub fn execve_fields(&self) -> ExecveFieldSet {
        self.execve_req.load()
    }

    /// Union of every registered checker's exit-notify-parent field requests.
    pub fn exit_notify_parent_fields(&self) -> ExitNotifyParentFieldSet {
        self.exit_notify_parent_req.load()
    }

    /// Union of every registered checker's syscall field requests.
    pub fn syscall_fields(&self) -> SyscallFieldSet {
        self.syscall_req.load()
    }

    /// Union of every registered checker's container start field requests.
    pub fn container_start_fields(&self) -> ContainerStartFieldSet {
        self.container_start_req.load()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("checkers", &self.checkers().len())
            .field("syscall_fields", &self.syscall_fields())
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry wired into the instrumented kernel paths.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::new)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use seccheck_common::constants::SYSCALL_POINTS;
    use seccheck_common::error::SeccheckError;
    use seccheck_wire::messages::Open;

    use super::*;
    use crate::checker::TaskContext;
    use crate::fields::SyscallField;
    use crate::point::POINT_COUNT;

    /// Records its label into a shared log and optionally vetoes.
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        deny: Option<i32>,
    }

    impl Checker for Recorder {
        fn open(&self, _ctx: &TaskContext, _mask: SyscallFieldSet, _info: &Open) -> Result<()> {
            self.log.lock().unwrap().push(self.label);
            match self.deny {
                Some(errno) => Err(SeccheckError::denied(errno, self.label)),
                None => Ok(()),
            }
        }
    }

    fn recorder(
        label: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        deny: Option<i32>,
    ) -> Arc<dyn Checker> {
        Arc::new(Recorder {
            label,
            log: Arc::clone(log),
            deny,
        })
    }

    fn dispatch_open(registry: &Registry, point: Point) -> Result<()> {
        let ctx = TaskContext::default();
        let info = Open::default();
        registry.dispatch(point, |c| c.open(&ctx, SyscallFieldSet::empty(), &info))
    }

    const OPEN: Point = Point::SyscallEnter(2);

    #[test]
    fn nothing_is_enabled_initially() {
        let registry = Registry::new();
        for index in 0..POINT_COUNT {
            let point = Point::from_index(index).expect("point");
            assert!(!registry.enabled(point));
        }
    }

    #[test]
    fn dispatch_skips_disabled_points() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.append_checker(
            recorder("c1", &log, None),
            &CheckerRequest::for_points([Point::Execve]),
        );

        let mut calls = 0;
        registry
            .dispatch(OPEN, |_| {
                calls += 1;
                Ok(())
            })
            .expect("no-op");
        assert_eq!(calls, 0);
    }

    #[test]
    fn append_enables_requested_points_only() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.append_checker(recorder("c1", &log, None), &CheckerRequest::for_points([OPEN]));

        assert!(registry.enabled(OPEN));
        assert!(registry.syscall_enter_enabled(2));
        assert!(!registry.syscall_exit_enabled(2));
        assert!(!registry.enabled(Point::Clone));
    }

    #[test]
    fn enablement_is_monotonic() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.append_checker(recorder("c1", &log, None), &CheckerRequest::for_points([OPEN]));
        registry.append_checker(
            recorder("c2", &log, None),
            &CheckerRequest::for_points([Point::ContainerStart]),
        );
        assert!(registry.enabled(OPEN));
        assert!(registry.enabled(Point::ContainerStart));
    }

    #[test]
    fn checkers_run_in_registration_order() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in ["c1", "c2", "c3"] {
            registry.append_checker(
                recorder(label, &log, None),
                &CheckerRequest::for_points([OPEN]),
            );
        }

        for _ in 0..3 {
            dispatch_open(&registry, OPEN).expect("allowed");
        }
        assert_eq!(
            *log.lock().unwrap(),
            ["c1", "c2", "c3", "c1", "c2", "c3", "c1", "c2", "c3"]
        );
    }

    #[test]
    fn first_error_stops_the_chain() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let req = CheckerRequest::for_points([OPEN]);
        registry.append_checker(recorder("c1", &log, None), &req);
        registry.append_checker(recorder("c2", &log, Some(libc::EPERM)), &req);
        registry.append_checker(recorder("c3", &log, None), &req);

        let err = dispatch_open(&registry, OPEN).expect_err("denied");
        assert!(matches!(
            err,
            SeccheckError::Denied { errno: libc::EPERM, ref reason } if reason == "c2"
        ));
        assert_eq!(*log.lock().unwrap(), ["c1", "c2"]);
    }

    #[test]
    fn field_requests_are_unioned() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.append_checker(
            recorder("c1", &log, None),
            &CheckerRequest {
                syscall: SyscallField::FdPath.into(),
                ..CheckerRequest::default()
            },
        );
        registry.append_checker(
            recorder("c2", &log, None),
            &CheckerRequest {
                syscall: SyscallField::RawArgs.into(),
                execve: ExecveField::Argv.into(),
                ..CheckerRequest::default()
            },
        );

        let syscall = registry.syscall_fields();
        assert!(syscall.contains(SyscallField::FdPath));
        assert!(syscall.contains(SyscallField::RawArgs));
        assert!(registry.execve_fields().contains(ExecveField::Argv));
        assert!(registry.clone_fields().is_empty());
    }

    #[test]
    fn out_of_range_points_are_ignored() {
        let registry = Registry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sysno = u32::try_from(SYSCALL_POINTS).expect("fits");
        registry.append_checker(
            recorder("c1", &log, None),
            &CheckerRequest::for_points([Point::SyscallEnter(sysno)]),
        );
        assert!(!registry.syscall_enter_enabled(sysno));
        assert_eq!(registry.checkers().len(), 1);
    }

    #[test]
    fn concurrent_dispatch_sees_whole_prefixes() {
        const CHECKERS: usize = 64;
        let registry = Arc::new(Registry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut last = 0;
                    while !done.load(Ordering::Acquire) {
                        let len = registry.checkers().len();
                        assert!(len >= last, "checker list shrank");
                        last = len;
                    }
                })
            })
            .collect();

        for _ in 0..CHECKERS {
            registry.append_checker(recorder("c", &log, None), &CheckerRequest::for_points([OPEN]));
        }
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.join().expect("reader panicked");
        }
        assert_eq!(registry.checkers().len(), CHECKERS);
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(std::ptr::eq(global(), global()));
    }
}
