//! End-to-end tests driving the executor the way an event loop does:
//! register the wakeup fd, wait for readability with poll(2), drain.

use std::net::{IpAddr, Ipv4Addr};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pollpool::resolve::{self, AddrFamily};
use pollpool::{Executor, Task, TaskError, TaskStatus};

/// Wait for the wakeup fd to turn readable, like a reactor would.
fn wait_readable(fd: RawFd, timeout_ms: i32) -> bool {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    ret > 0 && (fds.revents & libc::POLLIN) != 0
}

/// Drain completions until `cond` holds or the deadline passes.
fn drive_until<F>(executor: &mut Executor, deadline: Duration, cond: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        if wait_readable(executor.read_fd(), 10) {
            executor.poll();
        }
    }
    cond()
}

/// A task that blocks until the returned handle releases it.
struct Gate {
    shared: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    fn new() -> Self {
        Self {
            shared: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    fn task(&self) -> Task<()> {
        let shared = Arc::clone(&self.shared);
        Task::new(move || {
            let (lock, ready) = &*shared;
            let mut released = lock.lock().expect("gate mutex poisoned");
            while !*released {
                released = ready.wait(released).expect("gate condvar wait failed");
            }
            Ok(())
        })
    }

    fn open(&self) {
        let (lock, ready) = &*self.shared;
        *lock.lock().expect("gate mutex poisoned") = true;
        ready.notify_all();
    }
}

#[test]
fn test_trivial_arithmetic_on_pool_of_two() {
    let mut executor = Executor::new(2).expect("failed to start executor");
    let futures: Vec<_> = [1, 2, 3]
        .into_iter()
        .map(|x| executor.submit(Task::new(move || Ok(x + 1))))
        .collect();

    let handles = futures.clone();
    let all_done = drive_until(&mut executor, Duration::from_secs(5), move || {
        handles.iter().all(|f| f.done())
    });
    assert!(all_done, "not all futures completed in time");

    for (future, expected) in futures.iter().zip([2, 3, 4]) {
        assert_eq!(future.result(Duration::ZERO), Some(expected));
        assert_eq!(future.error(Duration::ZERO), None);
    }
    executor.close();
}

#[test]
fn test_failing_task_reports_the_exact_error() {
    let mut executor = Executor::new(1).expect("failed to start executor");
    let future = executor.submit(Task::new(|| -> Result<i32, TaskError> {
        Err(TaskError::Failed("boom".to_string()))
    }));

    let handle = future.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        handle.done()
    }));
    assert_eq!(future.result(Duration::ZERO), None);
    assert_eq!(
        future.error(Duration::ZERO),
        Some(TaskError::Failed("boom".to_string()))
    );

    // Terminal state never changes, no matter how often we look.
    executor.poll();
    assert_eq!(
        future.error(Duration::ZERO),
        Some(TaskError::Failed("boom".to_string()))
    );
    executor.close();
}

#[test]
fn test_panicking_task_does_not_kill_its_worker() {
    let mut executor = Executor::new(1).expect("failed to start executor");
    let panicker = executor.submit(Task::new(|| -> Result<i32, TaskError> {
        panic!("kaboom")
    }));
    let survivor = executor.submit(Task::new(|| Ok("still here")));

    let panicker_handle = panicker.clone();
    let survivor_handle = survivor.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        panicker_handle.done() && survivor_handle.done()
    }));
    assert_eq!(
        panicker.error(Duration::ZERO),
        Some(TaskError::Panicked("kaboom".to_string()))
    );
    assert_eq!(survivor.result(Duration::ZERO), Some("still here"));
    executor.close();
}

#[test]
fn test_callbacks_fire_exactly_once_on_the_polling_thread() {
    let mut executor = Executor::new(2).expect("failed to start executor");
    let calls = Arc::new(AtomicUsize::new(0));
    let main_thread = thread::current().id();

    let future = executor.submit(Task::new(|| Ok(1)));
    let calls_in_callback = Arc::clone(&calls);
    future.add_done_callback(move |fut| {
        assert!(fut.done());
        assert_eq!(thread::current().id(), main_thread);
        calls_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    let handle = future.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        handle.done()
    }));
    // Keep draining; the callback must not run again.
    for _ in 0..10 {
        executor.poll();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Registered after completion: runs synchronously, right here.
    let late_calls = Arc::new(AtomicUsize::new(0));
    let late_in_callback = Arc::clone(&late_calls);
    future.add_done_callback(move |_| {
        late_in_callback.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    executor.close();
}

#[test]
fn test_cancel_wins_against_a_queued_task() {
    let mut executor = Executor::new(1).expect("failed to start executor");
    let gate = Gate::new();
    let blocker = executor.submit(gate.task());

    // The single worker is parked on the gate; the victim stays queued.
    let blocker_handle = blocker.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        blocker_handle.status() == TaskStatus::Running
    }));

    let victim = executor.submit(Task::new(|| Ok(99)));
    let cancel_calls = Arc::new(AtomicUsize::new(0));
    let calls_in_callback = Arc::clone(&cancel_calls);
    victim.add_done_callback(move |fut| {
        assert!(fut.cancelled());
        calls_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    assert!(victim.cancel());
    assert!(victim.done());
    assert!(victim.cancelled());
    assert_eq!(victim.status(), TaskStatus::Cancelled);
    assert_eq!(victim.result(Duration::ZERO), None);
    assert_eq!(victim.error(Duration::ZERO), None);
    assert_eq!(cancel_calls.load(Ordering::SeqCst), 1);

    gate.open();
    executor.close();

    // The worker dequeued the cancelled item after the gate opened; the
    // future must be unchanged and the callback not re-fired.
    assert_eq!(victim.result(Duration::ZERO), None);
    assert!(victim.cancelled());
    assert_eq!(cancel_calls.load(Ordering::SeqCst), 1);
    assert_eq!(blocker.status(), TaskStatus::Completed);
}

#[test]
fn test_cancel_after_completion_is_too_late() {
    let mut executor = Executor::new(1).expect("failed to start executor");
    let future = executor.submit(Task::new(|| Ok(5)));
    let handle = future.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        handle.done()
    }));
    assert!(!future.cancel());
    assert!(!future.cancelled());
    assert_eq!(future.result(Duration::ZERO), Some(5));
    executor.close();
}

#[test]
fn test_fifo_handoff_on_a_pool_of_one() {
    let mut executor = Executor::new(1).expect("failed to start executor");
    let starts = Arc::new(Mutex::new(Vec::new()));

    let slow_starts = Arc::clone(&starts);
    let slow = executor.submit(Task::new(move || {
        slow_starts.lock().expect("starts mutex poisoned").push("slow");
        thread::sleep(Duration::from_millis(80));
        Ok(())
    }));
    let fast_starts = Arc::clone(&starts);
    let fast = executor.submit(Task::new(move || {
        fast_starts.lock().expect("starts mutex poisoned").push("fast");
        Ok(())
    }));

    let slow_handle = slow.clone();
    let fast_handle = fast.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        slow_handle.done() && fast_handle.done()
    }));
    assert_eq!(
        *starts.lock().expect("starts mutex poisoned"),
        vec!["slow", "fast"]
    );
    executor.close();
}

#[test]
fn test_completions_can_arrive_out_of_submission_order() {
    let mut executor = Executor::new(2).expect("failed to start executor");
    let gate = Gate::new();
    let slow = executor.submit(gate.task());
    let fast = executor.submit(Task::new(|| Ok("overtook")));

    let dispatched = Arc::new(AtomicUsize::new(0));
    let dispatched_in_callback = Arc::clone(&dispatched);
    fast.add_done_callback(move |_| {
        dispatched_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    // The later submission finishes and is dispatched while the earlier
    // one is still parked on the gate.
    let counter = Arc::clone(&dispatched);
    let slow_handle = slow.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        counter.load(Ordering::SeqCst) == 1 && slow_handle.status() == TaskStatus::Running
    }));
    assert_eq!(fast.result(Duration::ZERO), Some("overtook"));
    assert!(!slow.done(), "gated task finished before its gate opened");

    gate.open();
    let slow_handle = slow.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        slow_handle.done()
    }));
    assert_eq!(slow.status(), TaskStatus::Completed);
    executor.close();
}

#[test]
fn test_wakeup_fd_readability_matches_pending_completions() {
    let mut executor = Executor::new(1).expect("failed to start executor");
    let fd = executor.read_fd();
    assert!(!wait_readable(fd, 50), "fd readable before any submission");

    let future = executor.submit(Task::new(|| Ok(())));
    assert!(
        wait_readable(fd, 5000),
        "fd never turned readable after completion"
    );
    assert!(executor.poll(), "readable fd did not yield a completion");
    assert!(future.done());

    // Drained: the fd goes quiet again.
    assert!(!executor.poll());
    assert!(!wait_readable(fd, 50));
    executor.close();
}

#[test]
fn test_close_flushes_unpolled_completions() {
    let mut executor = Executor::new(4).expect("failed to start executor");
    let notified = Arc::new(AtomicUsize::new(0));
    let mut futures = Vec::new();
    for i in 0..8 {
        let future = executor.submit(Task::new(move || Ok(i)));
        let notified = Arc::clone(&notified);
        future.add_done_callback(move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        });
        futures.push(future);
    }

    // No polling here: close() itself must deliver everything.
    executor.close();
    assert!(futures.iter().all(|f| f.done()));
    assert_eq!(notified.load(Ordering::SeqCst), 8);

    // Second close is a no-op.
    executor.close();
    assert_eq!(notified.load(Ordering::SeqCst), 8);
}

#[test]
fn test_close_on_fresh_executor_terminates_promptly() {
    let mut executor = Executor::new(3).expect("failed to start executor");
    let start = Instant::now();
    executor.close();
    assert!(start.elapsed() < Duration::from_secs(5));
    executor.close();
}

#[test]
fn test_drop_closes_the_pool() {
    let notified = Arc::new(AtomicUsize::new(0));
    {
        let executor = Executor::new(2).expect("failed to start executor");
        let future = executor.submit(Task::new(|| Ok(())));
        let notified = Arc::clone(&notified);
        future.add_done_callback(move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[test]
#[should_panic(expected = "submit on closed executor")]
fn test_submit_after_close_panics() {
    let mut executor = Executor::new(1).expect("failed to start executor");
    executor.close();
    let _ = executor.submit(Task::new(|| Ok(())));
}

#[test]
fn test_resolve_on_the_pool() {
    let mut executor = Executor::new(2).expect("failed to start executor");
    let future = resolve::submit_resolve(&executor, "127.0.0.1", AddrFamily::V4AndV6);
    let handle = future.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(5), move || {
        handle.done()
    }));
    assert_eq!(
        future.result(Duration::ZERO),
        Some(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
    );
    executor.close();
}

#[test]
fn test_many_tasks_across_many_workers() {
    let mut executor = Executor::new(4).expect("failed to start executor");
    let futures: Vec<_> = (0..64)
        .map(|i| executor.submit(Task::new(move || Ok(i * i))))
        .collect();

    let handles = futures.clone();
    assert!(drive_until(&mut executor, Duration::from_secs(10), move || {
        handles.iter().all(|f| f.done())
    }));
    for (i, future) in futures.iter().enumerate() {
        let i = i as i32;
        assert_eq!(future.result(Duration::ZERO), Some(i * i));
    }
    executor.close();
}
