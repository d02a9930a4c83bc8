// 该文件是 Shanan （山南西风） 项目的一部分。
// src/cache.rs - 数据缓存清除
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

//! 每次计时前把缓冲区逐行写回并逐出数据缓存，使每次转换都从冷缓存开始。

#[cfg(target_arch = "x86_64")]
mod arch {
  use std::arch::x86_64::{_mm_clflush, _mm_mfence};

  pub fn line_size() -> usize {
    64
  }

  pub unsafe fn flush_line(p: *const u8) {
    unsafe { _mm_clflush(p) }
  }

  pub fn barrier() {
    unsafe { _mm_mfence() }
  }
}

#[cfg(target_arch = "aarch64")]
mod arch {
  use std::arch::asm;

  /// CTR_EL0.DminLine 为 log2(字数)，Linux 允许 EL0 读取
  pub fn line_size() -> usize {
    let ctr: u64;
    unsafe { asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack)) };
    4 << ((ctr >> 16) & 0xf)
  }

  pub unsafe fn flush_line(p: *const u8) {
    unsafe { asm!("dc civac, {}", in(reg) p, options(nostack)) }
  }

  pub fn barrier() {
    unsafe { asm!("dsb ish", options(nostack)) }
  }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod arch {
  pub fn line_size() -> usize {
    64
  }

  pub unsafe fn flush_line(_p: *const u8) {}

  pub fn barrier() {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
  }
}

/// 当前架构是否真正支持清除数据缓存
pub const fn is_supported() -> bool {
  cfg!(any(target_arch = "x86_64", target_arch = "aarch64"))
}

/// 数据缓存行大小（字节）
pub fn line_size() -> usize {
  arch::line_size()
}

/// 写回并逐出覆盖 `buf` 的全部缓存行
pub fn flush_data_cache<T>(buf: &[T]) {
  let len = std::mem::size_of_val(buf);
  if len == 0 {
    return;
  }
  let line = arch::line_size();
  let start = buf.as_ptr() as usize & !(line - 1);
  let end = buf.as_ptr() as usize + len;
  let mut addr = start;
  while addr < end {
    // addr 所在的缓存行与 buf 相交
    unsafe { arch::flush_line(addr as *const u8) };
    addr += line;
  }
  arch::barrier();
}
