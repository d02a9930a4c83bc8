// 该文件是 Shanan （山南西风） 项目的一部分。
// src/harness.rs - 延迟异常测量
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
use tracing::{debug, info};

use crate::{
  cache::flush_data_cache,
  clock::{Clock, ClockError},
  frame::Workspace,
  kernel::Kernel,
};

/// 每次试验的计时次数
pub const DEFAULT_BATCH: usize = 20;
/// 平均耗时超过该值（毫秒）即视为异常
pub const DEFAULT_THRESHOLD_MS: f64 = 5.0;
/// 捕获模式下的计时次数
pub const DEFAULT_CAPTURE_LEN: usize = 200;

#[derive(Error, Debug)]
pub enum HarnessError {
  #[error("计时失败: {0}")]
  Clock(#[from] ClockError),
  #[error("测量状态为 {0:?}，无法执行该操作")]
  InvalidState(HarnessState),
}

#[derive(Debug, Clone, Copy)]
pub struct HarnessConfig {
  pub batch: usize,
  pub threshold_ms: f64,
  pub capture_len: usize,
}

impl Default for HarnessConfig {
  fn default() -> Self {
    Self {
      batch: DEFAULT_BATCH,
      threshold_ms: DEFAULT_THRESHOLD_MS,
      capture_len: DEFAULT_CAPTURE_LEN,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
  Normal,
  Capturing,
  Terminated,
}

/// 一次试验：若干次计时及其平均值
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
  pub index: u64,
  pub samples: Box<[f64]>,
  pub mean_ms: f64,
}

impl TrialResult {
  pub fn from_samples(index: u64, samples: Vec<f64>) -> Self {
    let mean_ms = mean(&samples);
    Self {
      index,
      samples: samples.into_boxed_slice(),
      mean_ms,
    }
  }

  /// 合成一个只有平均值的结果，用于回放或测试
  pub fn with_mean(index: u64, mean_ms: f64) -> Self {
    Self {
      index,
      samples: Box::new([]),
      mean_ms,
    }
  }

  pub fn exceeds(&self, threshold_ms: f64) -> bool {
    self.mean_ms > threshold_ms
  }

  pub fn max_ms(&self) -> f64 {
    self.samples.iter().copied().fold(f64::NAN, f64::max)
  }
}

/// 捕获模式下逐次记录的耗时序列
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyTrace {
  pub trigger: TrialResult,
  pub samples: Box<[f64]>,
}

impl AnomalyTrace {
  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }

  pub fn mean_ms(&self) -> f64 {
    mean(&self.samples)
  }

  pub fn max_ms(&self) -> f64 {
    self.samples.iter().copied().fold(f64::NAN, f64::max)
  }

  /// 超过阈值的样本数，用于区分单次尖峰与持续劣化
  pub fn spikes(&self, threshold_ms: f64) -> usize {
    self.samples.iter().filter(|&&s| s > threshold_ms).count()
  }
}

fn mean(samples: &[f64]) -> f64 {
  if samples.is_empty() {
    return 0.0;
  }
  samples.iter().sum::<f64>() / samples.len() as f64
}

/// 在冷缓存条件下反复计时转换核
pub struct Harness<K, C, const W: u32, const H: u32> {
  kernel: K,
  clock: C,
  config: HarnessConfig,
  workspace: Workspace<W, H>,
  state: HarnessState,
  trials_run: u64,
}

impl<K: Kernel, C: Clock, const W: u32, const H: u32> Harness<K, C, W, H> {
  pub fn new(kernel: K, clock: C, config: HarnessConfig) -> Self {
    Self::with_workspace(kernel, clock, config, Workspace::new())
  }

  pub fn with_workspace(
    kernel: K,
    clock: C,
    config: HarnessConfig,
    workspace: Workspace<W, H>,
  ) -> Self {
    info!(
      "测量配置: {}x{}, 每次试验 {} 次, 阈值 {} ms, 捕获 {} 次",
      W, H, config.batch, config.threshold_ms, config.capture_len
    );
    Self {
      kernel,
      clock,
      config,
      workspace,
      state: HarnessState::Normal,
      trials_run: 0,
    }
  }

  pub fn config(&self) -> &HarnessConfig {
    &self.config
  }

  pub fn state(&self) -> HarnessState {
    self.state
  }

  pub fn trials_run(&self) -> u64 {
    self.trials_run
  }

  pub fn is_anomalous(&self, trial: &TrialResult) -> bool {
    trial.exceeds(self.config.threshold_ms)
  }

  fn ensure(&self, state: HarnessState) -> Result<(), HarnessError> {
    if self.state != state {
      return Err(HarnessError::InvalidState(self.state));
    }
    Ok(())
  }

  /// 清除两块缓冲区的缓存后计时一次转换
  fn timed_convert(&mut self) -> Result<f64, HarnessError> {
    let (src, dst) = self.workspace.buffers();
    flush_data_cache(src);
    flush_data_cache(dst);

    let start = self.clock.now_ms()?;
    self.kernel.convert(src, dst);
    let end = self.clock.now_ms()?;
    Ok(end - start)
  }

  pub fn run_trial(&mut self) -> Result<TrialResult, HarnessError> {
    self.ensure(HarnessState::Normal)?;

    let mut samples = Vec::with_capacity(self.config.batch);
    for _ in 0..self.config.batch {
      samples.push(self.timed_convert()?);
    }

    let trial = TrialResult::from_samples(self.trials_run, samples);
    self.trials_run += 1;
    debug!(
      "试验 {} 平均 {:.3} ms, 最大 {:.3} ms",
      trial.index,
      trial.mean_ms,
      trial.max_ms()
    );
    Ok(trial)
  }

  /// 无穷的试验序列，出错时产生 `Err` 但不会结束
  pub fn trials(&mut self) -> Trials<'_, K, C, W, H> {
    Trials { harness: self }
  }

  /// 进入捕获模式并逐次记录耗时
  pub fn capture(&mut self, trigger: TrialResult) -> Result<AnomalyTrace, HarnessError> {
    self.ensure(HarnessState::Normal)?;
    self.state = HarnessState::Capturing;
    info!("进入捕获模式，记录 {} 次耗时", self.config.capture_len);

    let mut samples = Vec::with_capacity(self.config.capture_len);
    for _ in 0..self.config.capture_len {
      samples.push(self.timed_convert()?);
    }

    Ok(AnomalyTrace {
      trigger,
      samples: samples.into_boxed_slice(),
    })
  }

  /// 捕获结果输出后调用，之后不再接受任何测量
  pub fn terminate(&mut self) -> Result<(), HarnessError> {
    self.ensure(HarnessState::Capturing)?;
    self.state = HarnessState::Terminated;
    Ok(())
  }
}

pub struct Trials<'a, K, C, const W: u32, const H: u32> {
  harness: &'a mut Harness<K, C, W, H>,
}

impl<K: Kernel, C: Clock, const W: u32, const H: u32> Iterator for Trials<'_, K, C, W, H> {
  type Item = Result<TrialResult, HarnessError>;

  fn next(&mut self) -> Option<Self::Item> {
    Some(self.harness.run_trial())
  }
}
