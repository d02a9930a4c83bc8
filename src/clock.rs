// 该文件是 Shanan （山南西风） 项目的一部分。
// src/clock.rs - 单调启动时钟
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

use thiserror::Error;

#[derive(Error, Debug)]
#[error("读取启动时钟失败: {0}")]
pub struct ClockError(#[from] std::io::Error);

/// 以毫秒为单位的计时源
pub trait Clock {
  fn now_ms(&self) -> Result<f64, ClockError>;
}

impl<C: Clock + ?Sized> Clock for &C {
  fn now_ms(&self) -> Result<f64, ClockError> {
    (**self).now_ms()
  }
}

/// `CLOCK_BOOTTIME`：单调且计入系统挂起时间，不受 NTP 或手动校时影响
#[derive(Debug, Default, Clone, Copy)]
pub struct BootTimeClock;

impl Clock for BootTimeClock {
  fn now_ms(&self) -> Result<f64, ClockError> {
    let mut ts = libc::timespec {
      tv_sec: 0,
      tv_nsec: 0,
    };
    let ret = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
    if ret != 0 {
      return Err(ClockError(std::io::Error::last_os_error()));
    }
    Ok(ts.tv_sec as f64 * 1000.0 + ts.tv_nsec as f64 * 1e-6)
  }
}
