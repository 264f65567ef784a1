// 该文件是 Hongbiao （红标） 项目的一部分。
// src/task.rs - 批量推理任务
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

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, Ordering},
    mpsc,
  },
  thread,
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{BusyGuard, Detection, Detector, ModelHandle};

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("批量任务线程异常退出")]
  Panicked,
}

/// 协作式取消标记，每张图片开始前检查一次
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Release);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Acquire)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
  Idle,
  Running,
  Cancelled,
  Completed,
}

impl JobState {
  fn from_u8(value: u8) -> Self {
    match value {
      1 => JobState::Running,
      2 => JobState::Cancelled,
      3 => JobState::Completed,
      _ => JobState::Idle,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, JobState::Cancelled | JobState::Completed)
  }
}

#[derive(Debug, Clone, Default)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
  fn get(&self) -> JobState {
    JobState::from_u8(self.0.load(Ordering::Acquire))
  }

  fn set(&self, state: JobState) {
    self.0.store(state as u8, Ordering::Release);
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
  ImageCompleted {
    path: PathBuf,
    detections: Vec<Detection>,
  },
  ImageFailed {
    path: PathBuf,
    message: String,
  },
  Progress(usize),
  AllFinished,
}

/// 批量任务事件的接收者，事件在后台线程上按顺序投递
pub trait EventSink: Send + 'static {
  fn emit(&self, event: BatchEvent);
}

impl EventSink for mpsc::Sender<BatchEvent> {
  fn emit(&self, event: BatchEvent) {
    if self.send(event).is_err() {
      debug!("事件接收端已关闭");
    }
  }
}

impl EventSink for mpsc::SyncSender<BatchEvent> {
  fn emit(&self, event: BatchEvent) {
    if self.send(event).is_err() {
      debug!("事件接收端已关闭");
    }
  }
}

/// 一次批量推理，启动后即被消耗
#[derive(Debug)]
pub struct BatchJob {
  images: Vec<PathBuf>,
  confidence: f32,
  cancel: CancellationToken,
  state: SharedState,
}

impl BatchJob {
  pub fn new(images: Vec<PathBuf>, confidence: f32) -> Self {
    Self {
      images,
      confidence,
      cancel: CancellationToken::new(),
      state: SharedState::default(),
    }
  }

  pub fn images(&self) -> &[PathBuf] {
    &self.images
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn len(&self) -> usize {
    self.images.len()
  }

  pub fn is_empty(&self) -> bool {
    self.images.is_empty()
  }

  pub fn state(&self) -> JobState {
    self.state.get()
  }

  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }
}

/// 任务结束后的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
  pub total: usize,
  pub processed: usize,
  pub succeeded: Vec<PathBuf>,
  pub failed: Vec<(PathBuf, String)>,
  pub cancelled: bool,
}

pub struct JobHandle {
  cancel: CancellationToken,
  state: SharedState,
  thread: thread::JoinHandle<JobReport>,
}

impl JobHandle {
  /// 请求取消；正在处理的图片仍会完成
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  pub fn state(&self) -> JobState {
    self.state.get()
  }

  /// 任务已进入终止状态，`AllFinished` 发出前即为真
  pub fn is_finished(&self) -> bool {
    self.state().is_terminal()
  }

  pub fn join(self) -> Result<JobReport, TaskError> {
    self.thread.join().map_err(|_| TaskError::Panicked)
  }
}

/// 按输入顺序逐张推理
///
/// 每张图片先发出结果事件，再发出进度事件。
pub(crate) fn run_job<M: Detector, S: EventSink>(
  model: &ModelHandle<M>,
  images: &[PathBuf],
  confidence: f32,
  cancel: &CancellationToken,
  sink: &S,
) -> JobReport {
  let mut report = JobReport {
    total: images.len(),
    ..Default::default()
  };

  for (index, path) in images.iter().enumerate() {
    if cancel.is_cancelled() {
      warn!("任务已取消，剩余 {} 张图片未处理", images.len() - index);
      report.cancelled = true;
      break;
    }

    info!("处理第 {}/{} 张图片: {}", index + 1, images.len(), path.display());
    match model.predict(path, confidence) {
      Ok(detections) => {
        report.succeeded.push(path.clone());
        sink.emit(BatchEvent::ImageCompleted {
          path: path.clone(),
          detections,
        });
      }
      Err(e) => {
        warn!("推理失败: {}", e);
        let message = e.to_string();
        report.failed.push((path.clone(), message.clone()));
        sink.emit(BatchEvent::ImageFailed {
          path: path.clone(),
          message,
        });
      }
    }

    report.processed = index + 1;
    sink.emit(BatchEvent::Progress(index + 1));
  }

  report
}

pub(crate) fn spawn_job<M: Detector, S: EventSink>(
  model: Arc<ModelHandle<M>>,
  job: BatchJob,
  sink: S,
  guard: BusyGuard,
) -> std::io::Result<JobHandle> {
  let BatchJob {
    images,
    confidence,
    cancel,
    state,
  } = job;

  state.set(JobState::Running);
  let token = cancel.clone();
  let thread_state = state.clone();
  let spawned = thread::Builder::new()
    .name("hongbiao-batch".to_string())
    .spawn(move || {
      info!("开始批量推理，共 {} 张图片", images.len());
      let now = std::time::Instant::now();
      let report = run_job(&model, &images, confidence, &token, &sink);
      thread_state.set(if report.cancelled {
        JobState::Cancelled
      } else {
        JobState::Completed
      });
      info!(
        "批量推理结束: 成功 {}, 失败 {}, 耗时: {:.2?}",
        report.succeeded.len(),
        report.failed.len(),
        now.elapsed()
      );
      drop(guard);
      sink.emit(BatchEvent::AllFinished);
      report
    });

  match spawned {
    Ok(thread) => Ok(JobHandle {
      cancel,
      state,
      thread,
    }),
    Err(e) => {
      state.set(JobState::Idle);
      Err(e)
    }
  }
}
