// 该文件是 Hongbiao （红标） 项目的一部分。
// src/model/core.rs - 检测器定义
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

use std::path::Path;

/// 单个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4], // [x1, y1, x2, y2]，像素坐标
  pub confidence: f32,
  pub class_id: u32,
  pub class_name: String,
}

impl Detection {
  pub fn new(bbox: [f32; 4], confidence: f32, class_id: u32, class_name: impl Into<String>) -> Self {
    Self {
      bbox,
      confidence,
      class_id,
      class_name: class_name.into(),
    }
  }
}

/// 已加载的检测器实例
///
/// 一个实例同一时间只处理一张图片，但需要能被后台线程持有，
/// 因此要求 `Send + Sync`。
pub trait Detector: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 按类别编号排序的类别名称
  fn class_names(&self) -> Vec<String>;

  /// 对单张图片推理，只返回置信度不低于 `confidence` 的结果
  fn predict(&self, image: &Path, confidence: f32) -> Result<Vec<Detection>, Self::Error>;
}

/// 从权重文件构建检测器
pub trait DetectorProvider {
  type Model: Detector;
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(&self, path: &Path) -> Result<Self::Model, Self::Error>;
}
