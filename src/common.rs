// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-thread real-time setup.
//!
//! Each worker applies its own [`RealtimeConfig`] after it starts, rather than
//! inheriting whatever the spawning thread was configured with.

use crate::lidar::Error;
use clap::ValueEnum;
use std::fmt;
use tracing::{debug, warn};

/// What to do when real-time setup fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SetupPolicy {
    /// Log a warning and keep running with default scheduling.
    #[default]
    BestEffort,
    /// Fail start-up.
    Strict,
}

impl fmt::Display for SetupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupPolicy::BestEffort => write!(f, "best-effort"),
            SetupPolicy::Strict => write!(f, "strict"),
        }
    }
}

/// Scheduling attributes for one worker thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// `SCHED_FIFO` priority (1-99), `None` keeps the default scheduler.
    pub priority: Option<i32>,
    /// Pin the thread to this CPU.
    pub cpu: Option<usize>,
}

impl RealtimeConfig {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.cpu.is_none()
    }
}

/// Apply `config` to the calling thread.
///
/// Under [`SetupPolicy::Strict`] the first failure is returned as
/// [`Error::Setup`]; otherwise failures are logged and `Ok` is returned.
pub fn apply_realtime(
    stage: &str,
    config: &RealtimeConfig,
    policy: SetupPolicy,
) -> Result<(), Error> {
    if let Some(priority) = config.priority {
        match set_thread_priority(priority) {
            Ok(()) => debug!(stage, priority, "real-time fifo scheduler enabled"),
            Err(e) => {
                let msg = format!("{}: unable to set fifo priority {}: {}", stage, priority, e);
                match policy {
                    SetupPolicy::Strict => return Err(Error::Setup(msg)),
                    SetupPolicy::BestEffort => warn!("{}", msg),
                }
            }
        }
    }

    if let Some(cpu) = config.cpu {
        match pin_thread(cpu) {
            Ok(()) => debug!(stage, cpu, "thread pinned"),
            Err(e) => {
                let msg = format!("{}: unable to pin to cpu {}: {}", stage, cpu, e);
                match policy {
                    SetupPolicy::Strict => return Err(Error::Setup(msg)),
                    SetupPolicy::BestEffort => warn!("{}", msg),
                }
            }
        }
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn set_thread_priority(priority: i32) -> std::io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let tid = unsafe { libc::pthread_self() };
    let err = unsafe { libc::pthread_setschedparam(tid, libc::SCHED_FIFO, &param) };
    if err != 0 {
        // pthread functions return the error number rather than setting errno.
        return Err(std::io::Error::from_raw_os_error(err));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_thread_priority(_priority: i32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "real-time priority requires linux",
    ))
}

#[cfg(target_os = "linux")]
fn pin_thread(cpu: usize) -> std::io::Result<()> {
    if cpu >= libc::CPU_SETSIZE as usize {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cpu {} out of range", cpu),
        ));
    }

    let err = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        // pid 0 is the calling thread.
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if err != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn pin_thread(_cpu: usize) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "cpu affinity requires linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_noop() {
        let config = RealtimeConfig::default();
        assert!(config.is_empty());
        assert!(apply_realtime("test", &config, SetupPolicy::Strict).is_ok());
    }

    #[test]
    fn test_invalid_priority_strict_fails() {
        // SCHED_FIFO priorities stop at 99 so this fails even with privileges.
        let config = RealtimeConfig {
            priority: Some(1_000),
            cpu: None,
        };
        match apply_realtime("test", &config, SetupPolicy::Strict) {
            Err(Error::Setup(msg)) => assert!(msg.starts_with("test:")),
            other => panic!("expected setup error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_cpu_best_effort_continues() {
        let config = RealtimeConfig {
            priority: None,
            cpu: Some(1 << 20),
        };
        assert!(apply_realtime("test", &config, SetupPolicy::BestEffort).is_ok());
        assert!(apply_realtime("test", &config, SetupPolicy::Strict).is_err());
    }
}
