// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 延迟异常复现任务
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

use std::{io::Write, sync::mpsc::Receiver};

use tracing::{info, warn};

use crate::{
  clock::Clock,
  harness::{AnomalyTrace, Harness, TrialResult},
  kernel::Kernel,
};

pub fn write_trial<O: Write>(out: &mut O, trial: &TrialResult) -> std::io::Result<()> {
  writeln!(out, "got {:.6}", trial.mean_ms)
}

pub fn write_hit<O: Write>(out: &mut O, trial: &TrialResult) -> std::io::Result<()> {
  writeln!(out, "HIT {:.6}", trial.mean_ms)?;
  writeln!(out, "BAD")
}

pub fn write_trace<O: Write>(out: &mut O, trace: &AnomalyTrace) -> std::io::Result<()> {
  for sample in trace.samples.iter() {
    write!(out, "{:.2}   ", sample)?;
  }
  writeln!(out)?;
  out.flush()
}

#[derive(Debug)]
pub enum TaskOutcome {
  /// 捕获到异常，之后进程应当退出
  Captured(AnomalyTrace),
  /// 被中断或达到试验次数上限，未发现异常
  Stopped { trials: u64 },
}

#[derive(Default, Debug)]
pub struct LatencyTask {
  max_trials: Option<u64>,
  interrupt: Option<Receiver<()>>,
}

impl LatencyTask {
  pub fn with_max_trials(mut self, max_trials: Option<u64>) -> Self {
    self.max_trials = max_trials;
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }

  /// 逐个消费试验结果，输出正常试验，返回第一个平均耗时超过阈值的试验
  pub fn find_anomaly<I, E, O>(
    &self,
    trials: I,
    threshold_ms: f64,
    out: &mut O,
  ) -> anyhow::Result<Option<TrialResult>>
  where
    I: IntoIterator<Item = Result<TrialResult, E>>,
    E: std::error::Error + Send + Sync + 'static,
    O: Write,
  {
    let limit = self.max_trials.unwrap_or(u64::MAX);
    // range 在前：达到上限后不再拉取下一次试验
    for (count, trial) in (0..limit).zip(trials) {
      let trial = trial?;
      if trial.exceeds(threshold_ms) {
        return Ok(Some(trial));
      }
      write_trial(out, &trial)?;
      if self.interrupted() {
        warn!("中断信号接收，在第 {} 次试验后退出", count + 1);
        return Ok(None);
      }
    }

    info!("试验序列结束，未发现异常");
    Ok(None)
  }

  pub fn run<K, C, O, const W: u32, const H: u32>(
    self,
    harness: &mut Harness<K, C, W, H>,
    out: &mut O,
  ) -> anyhow::Result<TaskOutcome>
  where
    K: Kernel,
    C: Clock,
    O: Write,
  {
    info!("开始测量...");
    let threshold_ms = harness.config().threshold_ms;
    let Some(trigger) = self.find_anomaly(harness.trials(), threshold_ms, out)? else {
      return Ok(TaskOutcome::Stopped {
        trials: harness.trials_run(),
      });
    };

    warn!(
      "第 {} 次试验平均耗时 {:.3} ms 超过阈值 {} ms，检测时间 {}",
      trigger.index,
      trigger.mean_ms,
      threshold_ms,
      chrono::Local::now().to_rfc3339()
    );
    write_hit(out, &trigger)?;
    out.flush()?;

    let trace = harness.capture(trigger)?;
    write_trace(out, &trace)?;
    harness.terminate()?;

    info!(
      "捕获完成: {} 次, 平均 {:.3} ms, 最大 {:.3} ms, 超阈值 {} 次",
      trace.len(),
      trace.mean_ms(),
      trace.max_ms(),
      trace.spikes(threshold_ms)
    );
    Ok(TaskOutcome::Captured(trace))
  }
}
