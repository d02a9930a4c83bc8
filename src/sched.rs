// 该文件是 Shanan （山南西风） 项目的一部分。
// src/sched.rs - 实时调度请求
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::io;

use thiserror::Error;
use tracing::{debug, info};

/// 与生产环境中 modeld 进程（`chrt -f 51`）一致的优先级
pub const PRODUCTION_PRIORITY: i32 = 51;

#[derive(Error, Debug)]
pub enum SchedError {
  #[error("优先级 {priority} 超出 {policy} 的有效范围 [{min}, {max}]")]
  InvalidPriority {
    policy: SchedPolicy,
    priority: i32,
    min: i32,
    max: i32,
  },
  #[error("没有设置实时调度的权限（需要 root 或 CAP_SYS_NICE）: {0}")]
  PermissionDenied(io::Error),
  #[error("设置调度策略失败: {0}")]
  Os(io::Error),
}

impl From<io::Error> for SchedError {
  fn from(err: io::Error) -> Self {
    match err.raw_os_error() {
      Some(libc::EPERM) => SchedError::PermissionDenied(err),
      _ => SchedError::Os(err),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
  Other,
  Fifo,
  RoundRobin,
  Batch,
  Idle,
  Deadline,
  Unknown(i32),
}

impl SchedPolicy {
  fn from_raw(raw: i32) -> Self {
    match raw {
      libc::SCHED_OTHER => SchedPolicy::Other,
      libc::SCHED_FIFO => SchedPolicy::Fifo,
      libc::SCHED_RR => SchedPolicy::RoundRobin,
      libc::SCHED_BATCH => SchedPolicy::Batch,
      libc::SCHED_IDLE => SchedPolicy::Idle,
      libc::SCHED_DEADLINE => SchedPolicy::Deadline,
      other => SchedPolicy::Unknown(other),
    }
  }

  fn as_raw(self) -> i32 {
    match self {
      SchedPolicy::Other => libc::SCHED_OTHER,
      SchedPolicy::Fifo => libc::SCHED_FIFO,
      SchedPolicy::RoundRobin => libc::SCHED_RR,
      SchedPolicy::Batch => libc::SCHED_BATCH,
      SchedPolicy::Idle => libc::SCHED_IDLE,
      SchedPolicy::Deadline => libc::SCHED_DEADLINE,
      SchedPolicy::Unknown(raw) => raw,
    }
  }

  pub fn is_realtime(self) -> bool {
    matches!(self, SchedPolicy::Fifo | SchedPolicy::RoundRobin)
  }
}

impl std::fmt::Display for SchedPolicy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SchedPolicy::Other => write!(f, "SCHED_OTHER"),
      SchedPolicy::Fifo => write!(f, "SCHED_FIFO"),
      SchedPolicy::RoundRobin => write!(f, "SCHED_RR"),
      SchedPolicy::Batch => write!(f, "SCHED_BATCH"),
      SchedPolicy::Idle => write!(f, "SCHED_IDLE"),
      SchedPolicy::Deadline => write!(f, "SCHED_DEADLINE"),
      SchedPolicy::Unknown(raw) => write!(f, "SCHED_UNKNOWN({})", raw),
    }
  }
}

/// 当前线程调度策略的设置接口
pub trait ThreadScheduler {
  fn priority_range(&self, policy: SchedPolicy) -> io::Result<(i32, i32)>;
  fn set_scheduler(&self, policy: SchedPolicy, priority: i32) -> io::Result<()>;
  fn current_policy(&self) -> io::Result<SchedPolicy>;
}

/// 基于 `sched_setscheduler(2)` 的实现，pid 为 0 即调用线程
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxScheduler;

impl ThreadScheduler for LinuxScheduler {
  fn priority_range(&self, policy: SchedPolicy) -> io::Result<(i32, i32)> {
    let min = unsafe { libc::sched_get_priority_min(policy.as_raw()) };
    if min < 0 {
      return Err(io::Error::last_os_error());
    }
    let max = unsafe { libc::sched_get_priority_max(policy.as_raw()) };
    if max < 0 {
      return Err(io::Error::last_os_error());
    }
    Ok((min, max))
  }

  fn set_scheduler(&self, policy: SchedPolicy, priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
      sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, policy.as_raw(), &param) };
    if ret != 0 {
      return Err(io::Error::last_os_error());
    }
    Ok(())
  }

  fn current_policy(&self) -> io::Result<SchedPolicy> {
    let ret = unsafe { libc::sched_getscheduler(0) };
    if ret < 0 {
      return Err(io::Error::last_os_error());
    }
    Ok(SchedPolicy::from_raw(ret & !libc::SCHED_RESET_ON_FORK))
  }
}

/// 成功生效的调度请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeGrant {
  pub policy: SchedPolicy,
  pub priority: i32,
}

/// 对调用线程的实时调度请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeRequest {
  policy: SchedPolicy,
  priority: i32,
}

impl RealtimeRequest {
  /// 先进先出的固定优先级调度
  pub fn fifo(priority: i32) -> Self {
    Self {
      policy: SchedPolicy::Fifo,
      priority,
    }
  }

  pub fn policy(&self) -> SchedPolicy {
    self.policy
  }

  pub fn priority(&self) -> i32 {
    self.priority
  }

  pub fn apply(&self) -> Result<RealtimeGrant, SchedError> {
    self.apply_with(&LinuxScheduler)
  }

  pub fn apply_with<S: ThreadScheduler>(&self, scheduler: &S) -> Result<RealtimeGrant, SchedError> {
    let (min, max) = scheduler.priority_range(self.policy)?;
    debug!("{} 优先级范围: [{}, {}]", self.policy, min, max);
    if self.priority < min || self.priority > max {
      return Err(SchedError::InvalidPriority {
        policy: self.policy,
        priority: self.priority,
        min,
        max,
      });
    }

    scheduler.set_scheduler(self.policy, self.priority)?;
    info!("已切换到 {}，优先级 {}", self.policy, self.priority);

    Ok(RealtimeGrant {
      policy: self.policy,
      priority: self.priority,
    })
  }
}

impl Default for RealtimeRequest {
  fn default() -> Self {
    Self::fifo(PRODUCTION_PRIORITY)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;

  struct MockScheduler {
    result: Option<i32>,
    calls: RefCell<Vec<(SchedPolicy, i32)>>,
  }

  impl MockScheduler {
    fn ok() -> Self {
      Self {
        result: None,
        calls: RefCell::new(Vec::new()),
      }
    }

    fn failing(errno: i32) -> Self {
      Self {
        result: Some(errno),
        calls: RefCell::new(Vec::new()),
      }
    }
  }

  impl ThreadScheduler for MockScheduler {
    fn priority_range(&self, _policy: SchedPolicy) -> io::Result<(i32, i32)> {
      Ok((1, 99))
    }

    fn set_scheduler(&self, policy: SchedPolicy, priority: i32) -> io::Result<()> {
      self.calls.borrow_mut().push((policy, priority));
      match self.result {
        Some(errno) => Err(io::Error::from_raw_os_error(errno)),
        None => Ok(()),
      }
    }

    fn current_policy(&self) -> io::Result<SchedPolicy> {
      Ok(SchedPolicy::Other)
    }
  }

  #[test]
  fn default_request_matches_production() {
    let req = RealtimeRequest::default();
    assert_eq!(req.policy(), SchedPolicy::Fifo);
    assert_eq!(req.priority(), 51);
  }

  #[test]
  fn grant_on_success() {
    let sched = MockScheduler::ok();
    let grant = RealtimeRequest::fifo(51).apply_with(&sched).unwrap();
    assert_eq!(
      grant,
      RealtimeGrant {
        policy: SchedPolicy::Fifo,
        priority: 51
      }
    );
    assert_eq!(*sched.calls.borrow(), vec![(SchedPolicy::Fifo, 51)]);
  }

  #[test]
  fn permission_denied_is_reported() {
    let sched = MockScheduler::failing(libc::EPERM);
    let err = RealtimeRequest::fifo(51).apply_with(&sched).unwrap_err();
    assert!(matches!(err, SchedError::PermissionDenied(_)));
  }

  #[test]
  fn other_os_errors_are_kept() {
    let sched = MockScheduler::failing(libc::ESRCH);
    let err = RealtimeRequest::fifo(51).apply_with(&sched).unwrap_err();
    assert!(matches!(err, SchedError::Os(_)));
  }

  #[test]
  fn out_of_range_priority_is_rejected_before_syscall() {
    let sched = MockScheduler::ok();
    let err = RealtimeRequest::fifo(0).apply_with(&sched).unwrap_err();
    assert!(matches!(
      err,
      SchedError::InvalidPriority {
        priority: 0,
        min: 1,
        max: 99,
        ..
      }
    ));
    assert!(sched.calls.borrow().is_empty());
  }

  #[test]
  fn linux_fifo_range_is_sane() {
    let (min, max) = LinuxScheduler.priority_range(SchedPolicy::Fifo).unwrap();
    assert!(min >= 1);
    assert!(max >= PRODUCTION_PRIORITY);
  }

  #[test]
  fn linux_rejects_out_of_range() {
    let err = RealtimeRequest::fifo(1000).apply().unwrap_err();
    assert!(matches!(err, SchedError::InvalidPriority { .. }));
  }

  #[test]
  fn linux_reports_current_policy() {
    let policy = LinuxScheduler.current_policy().unwrap();
    assert!(!matches!(policy, SchedPolicy::Unknown(_)));
  }
}
