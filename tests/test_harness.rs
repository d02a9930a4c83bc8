// tests/test_harness.rs - 测量与捕获流程的端到端测试
//
// 用人为延迟的转换核替换真实实现，验证异常检测、捕获与终止。

use std::{cell::Cell, thread, time::Duration};

use shanan_lag::{
  clock::{BootTimeClock, Clock, ClockError},
  harness::{Harness, HarnessConfig, HarnessState},
  kernel::{Kernel, Yuv420ToYyyyuv},
  task::{LatencyTask, TaskOutcome},
};

struct SleepyKernel(Duration);

impl Kernel for SleepyKernel {
  fn convert(&self, _src: &[u8], dst: &mut [f32]) {
    thread::sleep(self.0);
    dst[0] = 1.0;
  }
}

/// 每次转换推进虚拟时间的时钟，转换核与时钟共享同一时间线
#[derive(Default)]
struct VirtualClock {
  now: Cell<f64>,
}

impl Clock for VirtualClock {
  fn now_ms(&self) -> Result<f64, ClockError> {
    Ok(self.now.get())
  }
}

struct AdvancingKernel<'a> {
  clock: &'a VirtualClock,
  costs: Vec<f64>,
  calls: Cell<usize>,
}

impl Kernel for AdvancingKernel<'_> {
  fn convert(&self, _src: &[u8], _dst: &mut [f32]) {
    let i = self.calls.get();
    self.calls.set(i + 1);
    let cost = self.costs[i.min(self.costs.len() - 1)];
    self.clock.now.set(self.clock.now.get() + cost);
  }
}

fn parse_report(out: &[u8]) -> Vec<String> {
  String::from_utf8(out.to_vec())
    .unwrap()
    .lines()
    .map(str::to_owned)
    .collect()
}

#[test]
fn slow_kernel_is_captured_and_terminates() {
  let mut harness = Harness::<_, _, 8, 4>::new(
    SleepyKernel(Duration::from_millis(6)),
    BootTimeClock,
    HarnessConfig::default(),
  );

  let mut out = Vec::new();
  let outcome = LatencyTask::default()
    .with_max_trials(Some(3))
    .run(&mut harness, &mut out)
    .unwrap();

  let trace = match outcome {
    TaskOutcome::Captured(trace) => trace,
    other => panic!("expected a capture, got {:?}", other),
  };
  assert_eq!(trace.len(), 200);
  assert!(trace.samples.iter().all(|&s| s >= 5.9));
  assert!(trace.trigger.mean_ms > 5.0);
  assert_eq!(harness.state(), HarnessState::Terminated);

  let lines = parse_report(&out);
  assert_eq!(lines.len(), 3);
  assert!(lines[0].starts_with("HIT "));
  assert_eq!(lines[1], "BAD");
  assert_eq!(lines[2].split_whitespace().count(), 200);
  for value in lines[2].split_whitespace() {
    let (_, decimals) = value.split_once('.').unwrap();
    assert_eq!(decimals.len(), 2, "{value}");
  }
}

#[test]
fn normal_trials_then_capture() {
  let clock = VirtualClock::default();
  // 两次正常试验（每次 20 次转换），之后持续变慢
  let mut costs = vec![1.0; 40];
  costs.push(9.0);
  let kernel = AdvancingKernel {
    clock: &clock,
    costs,
    calls: Cell::new(0),
  };
  let mut harness = Harness::<_, _, 4, 4>::new(&kernel, &clock, HarnessConfig::default());

  let mut out = Vec::new();
  let outcome = LatencyTask::default().run(&mut harness, &mut out).unwrap();
  assert!(matches!(outcome, TaskOutcome::Captured(_)));

  let lines = parse_report(&out);
  assert_eq!(lines[0], "got 1.000000");
  assert_eq!(lines[1], "got 1.000000");
  assert_eq!(lines[2], "HIT 9.000000");
  assert_eq!(lines[3], "BAD");
  assert_eq!(lines[4].split_whitespace().filter(|v| *v == "9.00").count(), 200);
  assert_eq!(lines.len(), 5);

  assert_eq!(kernel.calls.get(), 40 + 20 + 200);
  assert_eq!(harness.trials_run(), 3);
}

#[test]
fn fast_kernel_stops_at_trial_limit() {
  let mut harness = Harness::<_, _, 64, 32>::new(
    Yuv420ToYyyyuv::<64, 32>::new(),
    BootTimeClock,
    HarnessConfig {
      threshold_ms: 1000.0,
      ..HarnessConfig::default()
    },
  );

  let mut out = Vec::new();
  let outcome = LatencyTask::default()
    .with_max_trials(Some(4))
    .run(&mut harness, &mut out)
    .unwrap();

  assert!(matches!(outcome, TaskOutcome::Stopped { trials: 4 }));
  assert_eq!(harness.state(), HarnessState::Normal);
  let lines = parse_report(&out);
  assert_eq!(lines.len(), 4);
  assert!(lines.iter().all(|l| l.starts_with("got ")));
}
