// 该文件是 Hongbiao （红标） 项目的一部分。
// src/settings.rs - 持久化设置
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
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::label::write_atomic;

pub const LAST_MODEL_PATH: &str = "last_model_path";
pub const CONFIDENCE_THRESHOLD: &str = "confidence_threshold";

pub const DEFAULT_CONFIDENCE: f32 = 0.25;
pub const MIN_CONFIDENCE: f32 = 0.01;
pub const MAX_CONFIDENCE: f32 = 1.0;

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("设置文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 键值设置存储
pub trait SettingsStore {
  fn get(&self, key: &str) -> Option<String>;
  fn set(&mut self, key: &str, value: &str);
  fn remove(&mut self, key: &str);
  fn save(&self) -> Result<(), SettingsError>;

  fn last_model_path(&self) -> Option<PathBuf> {
    self
      .get(LAST_MODEL_PATH)
      .filter(|p| !p.is_empty())
      .map(PathBuf::from)
  }

  fn confidence(&self) -> f32 {
    self
      .get(CONFIDENCE_THRESHOLD)
      .and_then(|v| v.parse::<f32>().ok())
      .filter(|v| v.is_finite())
      .map(|v| v.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE))
      .unwrap_or(DEFAULT_CONFIDENCE)
  }

  fn set_confidence(&mut self, confidence: f32) {
    let value = confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
    self.set(CONFIDENCE_THRESHOLD, &value.to_string());
  }
}

/// 仅存在于内存中的设置
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
  values: BTreeMap<String, String>,
}

impl SettingsStore for MemorySettings {
  fn get(&self, key: &str) -> Option<String> {
    self.values.get(key).cloned()
  }

  fn set(&mut self, key: &str, value: &str) {
    self.values.insert(key.to_string(), value.to_string());
  }

  fn remove(&mut self, key: &str) {
    self.values.remove(key);
  }

  fn save(&self) -> Result<(), SettingsError> {
    Ok(())
  }
}

/// 保存在 JSON 文件中的设置
#[derive(Debug, Clone)]
pub struct JsonSettings {
  path: PathBuf,
  values: Map<String, Value>,
}

impl JsonSettings {
  /// 文件不存在时从空设置开始
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
    let path = path.into();
    let values = match std::fs::read_to_string(&path) {
      Ok(content) => match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => map,
        other => {
          warn!("设置文件不是 JSON 对象，忽略: {}", other);
          Map::new()
        }
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!("设置文件不存在: {}", path.display());
        Map::new()
      }
      Err(e) => return Err(e.into()),
    };
    Ok(Self { path, values })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl SettingsStore for JsonSettings {
  fn get(&self, key: &str) -> Option<String> {
    match self.values.get(key)? {
      Value::String(s) => Some(s.clone()),
      Value::Null => None,
      other => Some(other.to_string()),
    }
  }

  fn set(&mut self, key: &str, value: &str) {
    self
      .values
      .insert(key.to_string(), Value::String(value.to_string()));
  }

  fn remove(&mut self, key: &str) {
    self.values.remove(key);
  }

  fn save(&self) -> Result<(), SettingsError> {
    let content = serde_json::to_string_pretty(&self.values)?;
    write_atomic(&self.path, content.as_bytes())?;
    debug!("设置已保存: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_settings_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let mut settings = JsonSettings::open(&path).unwrap();
    assert_eq!(settings.last_model_path(), None);
    settings.set(LAST_MODEL_PATH, "/models/yolo.onnx");
    settings.set_confidence(0.4);
    settings.save().unwrap();

    let reopened = JsonSettings::open(&path).unwrap();
    assert_eq!(
      reopened.last_model_path(),
      Some(PathBuf::from("/models/yolo.onnx"))
    );
    assert!((reopened.confidence() - 0.4).abs() < 1e-6);
  }

  #[test]
  fn confidence_defaults_and_clamps() {
    let mut settings = MemorySettings::default();
    assert_eq!(settings.confidence(), DEFAULT_CONFIDENCE);

    settings.set(CONFIDENCE_THRESHOLD, "not a number");
    assert_eq!(settings.confidence(), DEFAULT_CONFIDENCE);

    settings.set_confidence(3.0);
    assert_eq!(settings.confidence(), MAX_CONFIDENCE);

    settings.set(CONFIDENCE_THRESHOLD, "0");
    assert_eq!(settings.confidence(), MIN_CONFIDENCE);
  }

  #[test]
  fn numeric_json_values_are_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"confidence_threshold": 0.5, "last_model_path": ""}"#).unwrap();

    let settings = JsonSettings::open(&path).unwrap();
    assert_eq!(settings.confidence(), 0.5);
    assert_eq!(settings.last_model_path(), None);
  }

  #[test]
  fn malformed_json_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(
      JsonSettings::open(&path),
      Err(SettingsError::JsonError(_))
    ));
  }
}
