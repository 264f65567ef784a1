// 该文件是 Hongbiao （红标） 项目的一部分。
// tests/common/mod.rs - 测试用检测器与辅助函数
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

#![allow(dead_code)]

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{Arc, Mutex, mpsc},
};

use hongbiao::model::{Detection, Detector, DetectorProvider, InferenceEngine};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct FakeError(pub String);

/// 按文件名返回预设结果的检测器
#[derive(Clone, Default)]
pub struct FakeDetector {
  pub names: Vec<String>,
  pub outcomes: HashMap<String, Result<Vec<Detection>, String>>,
  /// 设置后每次推理先通知进入，再等待放行
  pub gate: Option<(mpsc::Sender<()>, Arc<Mutex<mpsc::Receiver<()>>>)>,
}

pub struct Gate {
  pub entered: mpsc::Receiver<()>,
  pub release: mpsc::Sender<()>,
}

impl FakeDetector {
  pub fn with_names(names: &[&str]) -> Self {
    Self {
      names: names.iter().map(|n| n.to_string()).collect(),
      ..Default::default()
    }
  }

  pub fn detect(mut self, file_name: &str, detections: Vec<Detection>) -> Self {
    self.outcomes.insert(file_name.to_string(), Ok(detections));
    self
  }

  pub fn fail(mut self, file_name: &str, message: &str) -> Self {
    self
      .outcomes
      .insert(file_name.to_string(), Err(message.to_string()));
    self
  }

  pub fn gated(&mut self) -> Gate {
    let (entered_tx, entered) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    self.gate = Some((entered_tx, Arc::new(Mutex::new(release_rx))));
    Gate { entered, release }
  }
}

impl Detector for FakeDetector {
  type Error = FakeError;

  fn class_names(&self) -> Vec<String> {
    self.names.clone()
  }

  fn predict(&self, image: &Path, _confidence: f32) -> Result<Vec<Detection>, Self::Error> {
    if let Some((entered, release)) = &self.gate {
      let _ = entered.send(());
      let _ = release.lock().unwrap().recv();
    }
    let name = image
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    match self.outcomes.get(&name) {
      Some(Ok(detections)) => Ok(detections.clone()),
      Some(Err(message)) => Err(FakeError(message.clone())),
      None => Ok(Vec::new()),
    }
  }
}

/// 模型文件内容为类别名称（每行一个），内容为 `corrupt` 时加载失败
#[derive(Clone, Default)]
pub struct FakeProvider {
  pub detector: FakeDetector,
}

impl DetectorProvider for FakeProvider {
  type Model = FakeDetector;
  type Error = FakeError;

  fn load(&self, path: &Path) -> Result<Self::Model, Self::Error> {
    let content = std::fs::read_to_string(path).map_err(|e| FakeError(e.to_string()))?;
    if content.trim() == "corrupt" {
      return Err(FakeError("无法解析模型文件".to_string()));
    }
    let mut detector = self.detector.clone();
    let names: Vec<String> = content
      .lines()
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .map(str::to_string)
      .collect();
    if !names.is_empty() {
      detector.names = names;
    }
    Ok(detector)
  }
}

pub fn write_model(dir: &Path, name: &str, content: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, content).unwrap();
  path
}

pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
  let path = dir.join(name);
  image::RgbImage::new(width, height).save(&path).unwrap();
  path
}

pub fn detection(bbox: [f32; 4], class_id: u32, class_name: &str) -> Detection {
  Detection::new(bbox, 0.9, class_id, class_name)
}

pub fn loaded_engine(dir: &Path, detector: FakeDetector) -> InferenceEngine<FakeProvider> {
  let mut engine = InferenceEngine::new(FakeProvider { detector });
  let model = write_model(dir, "model.onnx", "");
  engine.load(&model).unwrap();
  engine
}
