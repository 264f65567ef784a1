// 该文件是 Hongbiao （红标） 项目的一部分。
// src/orchestrator.rs - 自动标注流程
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
  sync::mpsc::Receiver,
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  input::ImageDimensions,
  label::{
    AnnotationReader, AnnotationWriter, BoundingBox, ClassList, CodecError, ErrorKind, ErrorRecord,
    class_list_path, label_path_for, write_atomic,
  },
  model::{Detection, DetectorProvider, EngineError, InferenceEngine},
  settings::{LAST_MODEL_PATH, SettingsError, SettingsStore},
  task::{BatchEvent, BatchJob, EventSink, JobHandle},
};

#[derive(Error, Debug)]
pub enum OrchestratorError {
  #[error("类别文件不存在且未加载模型: {0}")]
  MissingClassList(PathBuf),
  #[error("没有需要标注的图片")]
  NothingToLabel,
  #[error("无法读取图片尺寸: {path}: {reason}")]
  Dimensions { path: PathBuf, reason: String },
  #[error(transparent)]
  Engine(#[from] EngineError),
  #[error(transparent)]
  Codec(#[from] CodecError),
  #[error(transparent)]
  Settings(#[from] SettingsError),
}

/// 是否可以开始自动标注，按优先级给出第一个不满足的条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
  NoModel,
  NoSaveDir,
  NoImages,
  NoUnlabeled,
  Ready(usize),
}

pub fn readiness(model_loaded: bool, images: &[PathBuf], save_dir: Option<&Path>) -> Readiness {
  if !model_loaded {
    return Readiness::NoModel;
  }
  let Some(save_dir) = save_dir else {
    return Readiness::NoSaveDir;
  };
  if images.is_empty() {
    return Readiness::NoImages;
  }
  match unlabeled_images(images, save_dir).len() {
    0 => Readiness::NoUnlabeled,
    n => Readiness::Ready(n),
  }
}

/// 在 `save_dir` 中没有 `<stem>.txt` 的图片
pub fn unlabeled_images(images: &[PathBuf], save_dir: &Path) -> Vec<PathBuf> {
  images
    .iter()
    .filter(|image| !label_path_for(image, save_dir).exists())
    .cloned()
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassListOrigin {
  Existing,
  FromModel(usize),
}

/// 确保类别文件存在，缺失时用模型的类别生成
pub fn ensure_class_list<P: DetectorProvider>(
  save_dir: &Path,
  engine: &InferenceEngine<P>,
) -> Result<ClassListOrigin, OrchestratorError> {
  let path = class_list_path(save_dir);
  if path.exists() {
    return Ok(ClassListOrigin::Existing);
  }

  let names = match engine.class_names() {
    Ok(names) => names,
    Err(EngineError::NotLoaded) => return Err(OrchestratorError::MissingClassList(path)),
    Err(e) => return Err(e.into()),
  };
  let classes: ClassList = names.iter().collect();
  write_atomic(&path, classes.to_file_content().as_bytes()).map_err(|e| CodecError::io(&path, e))?;
  info!("根据模型创建类别文件 {}，共 {} 个类别", path.display(), classes.len());
  Ok(ClassListOrigin::FromModel(classes.len()))
}

/// 把一张图片的检测结果写成标注文件
///
/// 没有检测结果时不写文件，返回 `None`。
pub fn on_image_completed<D: ImageDimensions>(
  dims: &D,
  image: &Path,
  detections: &[Detection],
  save_dir: &Path,
  class_list: &mut ClassList,
) -> Result<Option<PathBuf>, OrchestratorError> {
  if detections.is_empty() {
    debug!("{} 没有检测结果，不写标注文件", image.display());
    return Ok(None);
  }

  let size = dims
    .dimensions(image)
    .map_err(|e| OrchestratorError::Dimensions {
      path: image.to_path_buf(),
      reason: e.to_string(),
    })?;

  let mut writer = AnnotationWriter::new(size);
  for det in detections {
    let [x1, y1, x2, y2] = det.bbox;
    writer.add_box(
      x1 as f64,
      y1 as f64,
      x2 as f64,
      y2 as f64,
      &det.class_name,
      false,
    );
  }

  let target = label_path_for(image, save_dir);
  writer.save(&target, class_list)?;
  Ok(Some(target))
}

/// 加载模型并记住路径
pub fn load_model<P: DetectorProvider, S: SettingsStore>(
  engine: &mut InferenceEngine<P>,
  path: &Path,
  settings: &mut S,
) -> Result<(), OrchestratorError> {
  engine.load(path)?;
  settings.set(LAST_MODEL_PATH, &path.to_string_lossy());
  settings.save()?;
  Ok(())
}

/// 启动时恢复上次使用的模型，加载失败则清除记录
pub fn restore_last_model<P: DetectorProvider, S: SettingsStore>(
  engine: &mut InferenceEngine<P>,
  settings: &mut S,
) -> Option<PathBuf> {
  let path = settings.last_model_path()?;
  if !path.exists() {
    debug!("上次使用的模型不存在: {}", path.display());
    return None;
  }

  match engine.load(&path) {
    Ok(()) => {
      info!("恢复上次使用的模型: {}", path.display());
      Some(path)
    }
    Err(e) => {
      warn!("无法恢复上次使用的模型: {}", e);
      settings.remove(LAST_MODEL_PATH);
      if let Err(e) = settings.save() {
        error!("保存设置失败: {}", e);
      }
      None
    }
  }
}

/// 当前显示图片的标注
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationView {
  pub image: PathBuf,
  pub label: PathBuf,
  pub shapes: Vec<BoundingBox>,
  pub errors: Vec<ErrorRecord>,
}

/// 一次自动标注的结果统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
  /// 写入了标注文件的图片
  pub labeled: Vec<PathBuf>,
  /// 推理成功但没有检测结果的图片
  pub empty: Vec<PathBuf>,
  pub errors: Vec<ErrorRecord>,
  pub progress: usize,
  pub finished: bool,
}

pub struct LabelingOrchestrator<D: ImageDimensions> {
  save_dir: PathBuf,
  dims: D,
  class_list: ClassList,
  current_image: Option<PathBuf>,
  view: Option<AnnotationView>,
  job_images: Vec<PathBuf>,
  summary: RunSummary,
}

impl<D: ImageDimensions> LabelingOrchestrator<D> {
  pub fn new(save_dir: impl Into<PathBuf>, dims: D) -> Self {
    let save_dir = save_dir.into();
    let class_list = ClassList::load(&class_list_path(&save_dir)).unwrap_or_default();
    Self {
      save_dir,
      dims,
      class_list,
      current_image: None,
      view: None,
      job_images: Vec::new(),
      summary: RunSummary::default(),
    }
  }

  pub fn save_dir(&self) -> &Path {
    &self.save_dir
  }

  pub fn class_list(&self) -> &ClassList {
    &self.class_list
  }

  pub fn current_image(&self) -> Option<&Path> {
    self.current_image.as_deref()
  }

  pub fn set_current_image(&mut self, image: Option<PathBuf>) {
    self.current_image = image;
    self.view = None;
  }

  pub fn view(&self) -> Option<&AnnotationView> {
    self.view.as_ref()
  }

  pub fn summary(&self) -> &RunSummary {
    &self.summary
  }

  pub fn unlabeled(&self, images: &[PathBuf]) -> Vec<PathBuf> {
    unlabeled_images(images, &self.save_dir)
  }

  /// 对未标注的图片启动批量推理
  ///
  /// 事件需要交回 `handle_event` 或 `drain` 处理。
  pub fn start<P: DetectorProvider, S: EventSink>(
    &mut self,
    engine: &InferenceEngine<P>,
    images: &[PathBuf],
    confidence: f32,
    sink: S,
  ) -> Result<JobHandle, OrchestratorError> {
    if engine.is_busy() {
      return Err(EngineError::Busy.into());
    }
    let unlabeled = self.unlabeled(images);
    if unlabeled.is_empty() {
      return Err(OrchestratorError::NothingToLabel);
    }

    ensure_class_list(&self.save_dir, engine)?;
    let path = class_list_path(&self.save_dir);
    self.class_list = ClassList::load(&path).map_err(|e| CodecError::io(&path, e))?;

    info!("开始自动标注 {} 张图片，置信度阈值 {}", unlabeled.len(), confidence);
    let job = BatchJob::new(unlabeled.clone(), confidence);
    let handle = engine.start_batch(job, sink)?;
    self.job_images = unlabeled;
    self.summary = RunSummary::default();
    Ok(handle)
  }

  /// 处理一个批量事件，返回任务是否已结束
  pub fn handle_event(&mut self, event: BatchEvent) -> bool {
    match event {
      BatchEvent::ImageCompleted { path, detections } => {
        match on_image_completed(
          &self.dims,
          &path,
          &detections,
          &self.save_dir,
          &mut self.class_list,
        ) {
          Ok(Some(label)) => {
            debug!("写入标注: {}", label.display());
            self.summary.labeled.push(path.clone());
            if self.current_image.as_deref() == Some(path.as_path()) {
              self.refresh_view();
            }
          }
          Ok(None) => self.summary.empty.push(path),
          Err(e) => {
            error!("无法写入 {} 的标注: {}", path.display(), e);
            self
              .summary
              .errors
              .push(ErrorRecord::at_path(ErrorKind::Io, &path, e.to_string()));
          }
        }
        false
      }
      BatchEvent::ImageFailed { path, message } => {
        warn!("{} 推理失败: {}", path.display(), message);
        self
          .summary
          .errors
          .push(ErrorRecord::at_path(ErrorKind::Prediction, &path, message));
        false
      }
      BatchEvent::Progress(progress) => {
        debug!("进度: {}/{}", progress, self.job_images.len());
        self.summary.progress = progress;
        false
      }
      BatchEvent::AllFinished => {
        self.on_job_finished();
        true
      }
    }
  }

  /// 在当前线程上依次处理事件，直到任务结束或发送端关闭
  pub fn drain(&mut self, events: &Receiver<BatchEvent>) -> &RunSummary {
    while let Ok(event) = events.recv() {
      if self.handle_event(event) {
        break;
      }
    }
    &self.summary
  }

  /// 任务结束后刷新当前显示图片的标注
  pub fn on_job_finished(&mut self) -> Option<&AnnotationView> {
    self.summary.finished = true;
    info!(
      "自动标注完成: 写入 {}, 无结果 {}, 错误 {}",
      self.summary.labeled.len(),
      self.summary.empty.len(),
      self.summary.errors.len()
    );

    let current = self.current_image.clone()?;
    if !self.job_images.contains(&current) || !label_path_for(&current, &self.save_dir).exists() {
      return None;
    }
    self.refresh_view()
  }

  /// 重新读取当前图片的标注
  pub fn refresh_view(&mut self) -> Option<&AnnotationView> {
    let image = self.current_image.clone()?;
    let label = label_path_for(&image, &self.save_dir);

    let size = match self.dims.dimensions(&image) {
      Ok(size) => size,
      Err(e) => {
        error!("无法读取图片尺寸 {}: {}", image.display(), e);
        self
          .summary
          .errors
          .push(ErrorRecord::at_path(ErrorKind::Io, &image, e.to_string()));
        return None;
      }
    };

    match AnnotationReader::open(&label, size, None) {
      Ok(reader) => {
        let (shapes, errors) = reader.into_parts();
        self.view = Some(AnnotationView {
          image,
          label,
          shapes,
          errors,
        });
        self.view.as_ref()
      }
      Err(e) => {
        error!("无法读取标注 {}: {}", label.display(), e);
        self
          .summary
          .errors
          .push(ErrorRecord::at_path(ErrorKind::Io, &label, e.to_string()));
        None
      }
    }
  }
}
