// 该文件是 Hongbiao （红标） 项目的一部分。
// src/label/writer.rs - 标注写入器
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

use tracing::{debug, info};

use crate::{
  input::ImageSize,
  label::{BoundingBox, ClassList, CodecError, class_list_path, write_atomic},
};

#[derive(Debug, Clone, PartialEq)]
struct PendingBox {
  bbox: [f64; 4], // [x_min, y_min, x_max, y_max]
  label: String,
  difficult: bool,
}

/// 累积标注框并按归一化格式保存
#[derive(Debug, Clone)]
pub struct AnnotationWriter {
  size: ImageSize,
  boxes: Vec<PendingBox>,
}

impl AnnotationWriter {
  pub fn new(size: ImageSize) -> Self {
    Self {
      size,
      boxes: Vec::new(),
    }
  }

  pub fn add_box(&mut self, xmin: f64, ymin: f64, xmax: f64, ymax: f64, label: &str, difficult: bool) {
    self.boxes.push(PendingBox {
      bbox: [xmin, ymin, xmax, ymax],
      label: label.to_string(),
      difficult,
    });
  }

  pub fn add_annotation(&mut self, b: &BoundingBox) {
    self.add_box(
      b.xmin as f64,
      b.ymin as f64,
      b.xmax as f64,
      b.ymax as f64,
      &b.label,
      b.difficult,
    );
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  fn to_line(&self, b: &PendingBox, class_list: &mut ClassList) -> String {
    let width = self.size.width as f64;
    let height = self.size.height as f64;
    let [x_min, y_min, x_max, y_max] = b.bbox;

    let x_center = (x_min + x_max) / 2.0 / width;
    let y_center = (y_min + y_max) / 2.0 / height;
    let w = (x_max - x_min) / width;
    let h = (y_max - y_min) / height;

    let class_index = class_list.index_or_insert(&b.label);
    format!(
      "{} {:.6} {:.6} {:.6} {:.6}",
      class_index, x_center, y_center, w, h
    )
  }

  /// 先用扩展后的 `class_list` 重写同目录下的类别文件，再写入标注文件
  ///
  /// 新出现的类别在类别文件写入成功后才追加到 `class_list`，
  /// 标注文件中的编号总能在磁盘上的类别文件中找到。
  pub fn save(&self, target: &Path, class_list: &mut ClassList) -> Result<(), CodecError> {
    if self.size.is_empty() {
      return Err(CodecError::InvalidImageSize(self.size));
    }

    let mut extended = class_list.clone();
    let mut content = String::new();
    for b in &self.boxes {
      if b.difficult {
        debug!("归一化格式不保存 difficult 标记: {}", b.label);
      }
      content.push_str(&self.to_line(b, &mut extended));
      content.push('\n');
    }

    let classes_path = target
      .parent()
      .map(class_list_path)
      .unwrap_or_else(|| class_list_path(Path::new(".")));
    write_atomic(&classes_path, extended.to_file_content().as_bytes())
      .map_err(|e| CodecError::io(&classes_path, e))?;
    let added = extended.len() - class_list.len();
    *class_list = extended;

    write_atomic(target, content.as_bytes()).map_err(|e| CodecError::io(target, e))?;

    info!(
      "保存 {} 个标注框到 {}，新增 {} 个类别",
      self.boxes.len(),
      target.display(),
      added
    );
    Ok(())
  }
}
