// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/dmon_lag.rs - 驾驶员监控预处理延迟复现
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

use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shanan_lag::{
  MODEL_HEIGHT, MODEL_WIDTH, cache,
  clock::BootTimeClock,
  harness::{
    DEFAULT_BATCH, DEFAULT_CAPTURE_LEN, DEFAULT_THRESHOLD_MS, Harness, HarnessConfig,
  },
  kernel::Yuv420ToYyyyuv,
  sched::{LinuxScheduler, PRODUCTION_PRIORITY, RealtimeRequest, ThreadScheduler},
  task::{LatencyTask, TaskOutcome},
};

/// 在实时调度下反复计时 YUV420 -> YYYYUV 转换，捕获延迟尖峰
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// SCHED_FIFO 优先级
  #[arg(long, default_value_t = PRODUCTION_PRIORITY, value_name = "LEVEL")]
  pub priority: i32,

  /// 实时调度设置失败时直接退出，而不是以普通调度继续
  #[arg(long)]
  pub require_realtime: bool,

  /// 异常阈值（毫秒）
  #[arg(long, default_value_t = DEFAULT_THRESHOLD_MS, value_name = "MS")]
  pub threshold_ms: f64,

  /// 每次试验的计时次数
  #[arg(long, default_value_t = DEFAULT_BATCH, value_name = "COUNT")]
  pub batch: usize,

  /// 捕获模式下的计时次数
  #[arg(long, default_value_t = DEFAULT_CAPTURE_LEN, value_name = "COUNT")]
  pub capture: usize,

  /// 最大试验次数，缺省为无限
  #[arg(long, value_name = "COUNT")]
  pub max_trials: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  if args.batch == 0 {
    anyhow::bail!("每次试验的计时次数必须大于 0");
  }

  info!("模型输入尺寸: {}x{}", MODEL_WIDTH, MODEL_HEIGHT);
  if !cache::is_supported() {
    warn!("当前架构不支持清除数据缓存，测量将在热缓存下进行");
  } else {
    info!("数据缓存行大小: {} 字节", cache::line_size());
  }

  let request = RealtimeRequest::fifo(args.priority);
  match request.apply() {
    Ok(grant) => info!("实时调度已生效: {} {}", grant.policy, grant.priority),
    Err(e) if args.require_realtime => {
      error!("实时调度设置失败: {}", e);
      return Err(e.into());
    }
    Err(e) => {
      warn!("实时调度设置失败，以普通调度继续，复现可能无效: {}", e);
    }
  }
  match LinuxScheduler.current_policy() {
    Ok(policy) if policy.is_realtime() => info!("当前调度策略: {}", policy),
    Ok(policy) => warn!("当前调度策略: {}（非实时）", policy),
    Err(e) => warn!("查询调度策略失败: {}", e),
  }

  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let config = HarnessConfig {
    batch: args.batch,
    threshold_ms: args.threshold_ms,
    capture_len: args.capture,
  };
  let mut harness = Harness::<_, _, MODEL_WIDTH, MODEL_HEIGHT>::new(
    Yuv420ToYyyyuv::<MODEL_WIDTH, MODEL_HEIGHT>::new(),
    BootTimeClock,
    config,
  );

  let outcome = LatencyTask::default()
    .with_max_trials(args.max_trials)
    .with_interrupt(rx)
    .run(&mut harness, &mut std::io::stdout().lock())?;

  match outcome {
    TaskOutcome::Captured(trace) => {
      info!("异常已捕获（{} 个样本），退出", trace.len());
      std::process::exit(0);
    }
    TaskOutcome::Stopped { trials } => {
      info!("任务完成，共 {} 次试验", trials);
    }
  }

  Ok(())
}
