// 该文件是 Hongbiao （红标） 项目的一部分。
// src/model/engine.rs - 推理引擎
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
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  model::{Detection, Detector, DetectorProvider},
  task::{self, BatchJob, EventSink, JobHandle},
};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型加载错误: {path}: {reason}")]
  ModelLoad { path: PathBuf, reason: String },
  #[error("尚未加载模型")]
  NotLoaded,
  #[error("I/O 错误: {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("推理失败: {path}: {reason}")]
  Prediction { path: PathBuf, reason: String },
  #[error("已有批量任务正在运行")]
  Busy,
  #[error("无法启动后台线程: {0}")]
  Spawn(std::io::Error),
}

/// 已加载的模型
///
/// 批量任务通过 `Arc` 持有同一个实例，重新加载只会替换引擎中的引用。
#[derive(Debug)]
pub struct ModelHandle<M> {
  path: PathBuf,
  class_names: Vec<String>,
  model: M,
}

impl<M: Detector> ModelHandle<M> {
  pub fn new(path: impl Into<PathBuf>, model: M) -> Self {
    let class_names = model.class_names();
    Self {
      path: path.into(),
      class_names,
      model,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn class_names(&self) -> &[String] {
    &self.class_names
  }

  pub fn predict(&self, image: &Path, confidence: f32) -> Result<Vec<Detection>, EngineError> {
    if !image.exists() {
      return Err(EngineError::Io {
        path: image.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "图片文件不存在"),
      });
    }

    let now = std::time::Instant::now();
    let detections = self
      .model
      .predict(image, confidence)
      .map_err(|e| EngineError::Prediction {
        path: image.to_path_buf(),
        reason: e.to_string(),
      })?;
    debug!(
      "{}: 检测到 {} 个物体，耗时: {:.2?}",
      image.display(),
      detections.len(),
      now.elapsed()
    );
    Ok(detections)
  }
}

/// 批量任务持有的占用标记，释放时清除
#[derive(Debug)]
pub(crate) struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
  fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| BusyGuard(flag.clone()))
  }
}

impl Drop for BusyGuard {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct InferenceEngine<P: DetectorProvider> {
  provider: P,
  model: Option<Arc<ModelHandle<P::Model>>>,
  busy: Arc<AtomicBool>,
}

impl<P: DetectorProvider> InferenceEngine<P> {
  pub fn new(provider: P) -> Self {
    Self {
      provider,
      model: None,
      busy: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 加载模型，成功后才替换旧模型
  pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
    let path = path.as_ref();
    if self.is_busy() {
      error!("批量任务运行中，拒绝重新加载模型: {}", path.display());
      return Err(EngineError::Busy);
    }
    if !path.exists() {
      return Err(EngineError::ModelLoad {
        path: path.to_path_buf(),
        reason: "模型文件不存在".to_string(),
      });
    }

    info!("加载模型文件: {}", path.display());
    let model = self
      .provider
      .load(path)
      .map_err(|e| EngineError::ModelLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
      })?;
    let handle = ModelHandle::new(path, model);
    info!("模型加载完成，共 {} 个类别", handle.class_names().len());

    self.model = Some(Arc::new(handle));
    Ok(())
  }

  pub fn is_loaded(&self) -> bool {
    self.model.is_some()
  }

  pub fn model_path(&self) -> Option<&Path> {
    self.model.as_ref().map(|handle| handle.path())
  }

  pub fn handle(&self) -> Result<Arc<ModelHandle<P::Model>>, EngineError> {
    self.model.clone().ok_or(EngineError::NotLoaded)
  }

  pub fn class_names(&self) -> Result<Vec<String>, EngineError> {
    self
      .model
      .as_ref()
      .map(|handle| handle.class_names().to_vec())
      .ok_or(EngineError::NotLoaded)
  }

  pub fn predict(&self, image: impl AsRef<Path>, confidence: f32) -> Result<Vec<Detection>, EngineError> {
    let handle = self.model.as_ref().ok_or(EngineError::NotLoaded)?;
    handle.predict(image.as_ref(), confidence)
  }

  pub fn is_busy(&self) -> bool {
    self.busy.load(Ordering::Acquire)
  }

  /// 在后台线程上启动批量推理，立即返回
  pub fn start_batch<S: EventSink>(&self, job: BatchJob, sink: S) -> Result<JobHandle, EngineError> {
    let handle = self.handle()?;
    let guard = BusyGuard::acquire(&self.busy).ok_or(EngineError::Busy)?;
    task::spawn_job(handle, job, sink, guard).map_err(EngineError::Spawn)
  }
}
