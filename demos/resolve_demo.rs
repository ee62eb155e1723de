//! Resolve host names on the pool while a poll(2) loop drains completions.
//!
//! Usage: resolve-demo [--threads=N] [--v4-only] HOST [HOST...]

use std::os::unix::io::RawFd;
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pollpool::resolve::{self, AddrFamily};
use pollpool::Executor;

struct DemoConfig {
    threads: usize,
    family: AddrFamily,
    hosts: Vec<String>,
}

fn parse_config() -> DemoConfig {
    let mut config = DemoConfig {
        threads: 4,
        family: AddrFamily::V4AndV6,
        hosts: Vec::new(),
    };
    for arg in std::env::args().skip(1) {
        if let Some(value) = arg.strip_prefix("--threads=") {
            config.threads = value.parse().unwrap_or(config.threads);
        } else if arg == "--v4-only" {
            config.family = AddrFamily::V4Only;
        } else {
            config.hosts.push(arg);
        }
    }
    config
}

fn wait_readable(fd: RawFd, timeout_ms: i32) -> bool {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    ret > 0 && (fds.revents & libc::POLLIN) != 0
}

fn main() {
    env_logger::init();
    let config = parse_config();
    if config.hosts.is_empty() {
        eprintln!("usage: resolve-demo [--threads=N] [--v4-only] HOST [HOST...]");
        process::exit(2);
    }

    let mut executor = Executor::new(config.threads).expect("failed to start executor");
    let pending = Arc::new(AtomicUsize::new(config.hosts.len()));

    for host in &config.hosts {
        let future = resolve::submit_resolve(&executor, host, config.family);
        let name = host.clone();
        let pending = Arc::clone(&pending);
        future.add_done_callback(move |fut| {
            match (fut.result(Duration::ZERO), fut.error(Duration::ZERO)) {
                (Some(addrs), _) => {
                    let rendered: Vec<String> =
                        addrs.iter().map(|addr| addr.to_string()).collect();
                    println!("{}: {}", name, rendered.join(", "));
                }
                (None, Some(err)) => println!("{}: lookup failed: {}", name, err),
                (None, None) => println!("{}: cancelled", name),
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        });
    }

    let fd = executor.read_fd();
    while pending.load(Ordering::Acquire) > 0 {
        if wait_readable(fd, 1000) {
            executor.poll();
        }
    }
    executor.close();
}
