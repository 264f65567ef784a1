// 该文件是 Hongbiao （红标） 项目的一部分。
// src/model/registry.rs - 模型文件发现
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL_EXTENSION: &str = "onnx";

#[derive(Error, Debug)]
pub enum RegistryError {
  #[error("模型文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("模型文件扩展名错误: {path}, 期望 .{expected}")]
  WrongExtension { path: PathBuf, expected: String },
}

/// 扫描目录中的模型文件，并记录当前选择的模型
#[derive(Debug, Clone)]
pub struct ModelRegistry {
  root: PathBuf,
  extension: String,
  available: Vec<PathBuf>,
  selected: Option<PathBuf>,
}

impl ModelRegistry {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      extension: DEFAULT_MODEL_EXTENSION.to_string(),
      available: Vec::new(),
      selected: None,
    }
  }

  pub fn with_extension(mut self, extension: &str) -> Self {
    self.extension = extension.trim_start_matches('.').to_string();
    self
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn extension(&self) -> &str {
    &self.extension
  }

  fn has_model_extension(&self, path: &Path) -> bool {
    path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| ext == self.extension)
      .unwrap_or(false)
  }

  /// 扫描根目录，结果按文件名排序
  ///
  /// 目录无法读取时返回空列表。
  pub fn scan(&mut self) -> &[PathBuf] {
    let mut models = Vec::new();
    match std::fs::read_dir(&self.root) {
      Ok(entries) => {
        for entry in entries.flatten() {
          let path = entry.path();
          if path.is_file() && self.has_model_extension(&path) {
            debug!("发现模型文件: {}", path.display());
            models.push(path);
          }
        }
      }
      Err(e) => {
        warn!("无法读取模型目录 {}: {}", self.root.display(), e);
      }
    }
    models.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    info!("在 {} 中找到 {} 个模型", self.root.display(), models.len());
    self.available = models;
    &self.available
  }

  pub fn models(&self) -> &[PathBuf] {
    &self.available
  }

  pub fn has_models(&self) -> bool {
    !self.available.is_empty()
  }

  /// 不带目录的模型文件名
  pub fn model_names(&self) -> Vec<String> {
    self
      .available
      .iter()
      .filter_map(|path| path.file_name())
      .map(|name| name.to_string_lossy().into_owned())
      .collect()
  }

  pub fn select(&mut self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
    let path = path.as_ref();
    if !path.exists() {
      return Err(RegistryError::NotFound(path.to_path_buf()));
    }
    if !self.has_model_extension(path) {
      return Err(RegistryError::WrongExtension {
        path: path.to_path_buf(),
        expected: self.extension.clone(),
      });
    }
    info!("选择模型: {}", path.display());
    self.selected = Some(path.to_path_buf());
    Ok(())
  }

  pub fn selected(&self) -> Option<&Path> {
    self.selected.as_deref()
  }
}
