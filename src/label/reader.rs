// 该文件是 Hongbiao （红标） 项目的一部分。
// src/label/reader.rs - 标注读取器
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

use tracing::{debug, warn};

use crate::{
  input::ImageSize,
  label::{BoundingBox, ClassList, CodecError, ErrorKind, ErrorRecord, class_list_path},
};

/// 解析归一化格式的标注文件
///
/// 只有标注文件本身无法读取时才会失败；格式错误、类别越界和类别文件缺失
/// 都记录在 `errors()` 中，解析继续进行。
#[derive(Debug, Clone)]
pub struct AnnotationReader {
  path: PathBuf,
  class_list_path: PathBuf,
  classes: ClassList,
  shapes: Vec<BoundingBox>,
  errors: Vec<ErrorRecord>,
}

impl AnnotationReader {
  pub fn open(path: &Path, size: ImageSize, class_list: Option<&Path>) -> Result<Self, CodecError> {
    let class_list_path = match class_list {
      Some(p) => p.to_path_buf(),
      None => class_list_path(path.parent().unwrap_or(Path::new("."))),
    };

    let mut errors = Vec::new();
    let classes = match ClassList::load(&class_list_path) {
      Ok(classes) => classes,
      Err(e) => {
        let message = if e.kind() == std::io::ErrorKind::NotFound {
          "类别文件不存在".to_string()
        } else {
          format!("无法读取类别文件: {}", e)
        };
        warn!("{}: {}", class_list_path.display(), message);
        errors.push(ErrorRecord::at_path(ErrorKind::Io, &class_list_path, message));
        ClassList::new()
      }
    };

    let content = std::fs::read_to_string(path).map_err(|e| CodecError::io(path, e))?;

    let mut shapes = Vec::new();
    for (index, line) in content.lines().enumerate() {
      let line_no = index + 1;
      let line = line.trim();
      if line.is_empty() {
        continue;
      }
      match parse_line(line, line_no, &classes, size) {
        Ok((shape, warning)) => {
          errors.extend(warning);
          shapes.push(shape);
        }
        Err(record) => errors.push(record),
      }
    }

    debug!(
      "读取 {}: {} 个标注框, {} 个错误",
      path.display(),
      shapes.len(),
      errors.len()
    );

    Ok(Self {
      path: path.to_path_buf(),
      class_list_path,
      classes,
      shapes,
      errors,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn class_list_path(&self) -> &Path {
    &self.class_list_path
  }

  pub fn classes(&self) -> &ClassList {
    &self.classes
  }

  pub fn shapes(&self) -> &[BoundingBox] {
    &self.shapes
  }

  pub fn errors(&self) -> &[ErrorRecord] {
    &self.errors
  }

  pub fn into_parts(self) -> (Vec<BoundingBox>, Vec<ErrorRecord>) {
    (self.shapes, self.errors)
  }
}

fn parse_value(token: &str, name: &str, line_no: usize) -> Result<f64, ErrorRecord> {
  match token.parse::<f64>() {
    Ok(value) if value.is_finite() => Ok(value),
    _ => Err(ErrorRecord::at_line(
      ErrorKind::Format,
      line_no,
      format!("{} 无法解析为数值: {:?}", name, token),
    )),
  }
}

fn to_pixel(normalized: f64, extent: u32) -> i32 {
  (normalized.clamp(0.0, 1.0) * extent as f64).round_ties_even() as i32
}

fn parse_line(
  line: &str,
  line_no: usize,
  classes: &ClassList,
  size: ImageSize,
) -> Result<(BoundingBox, Option<ErrorRecord>), ErrorRecord> {
  let tokens: Vec<&str> = line.split_whitespace().collect();
  let [class_token, xc, yc, w, h] = tokens.as_slice() else {
    return Err(ErrorRecord::at_line(
      ErrorKind::Format,
      line_no,
      format!("期望 5 个值, 实际 {} 个", tokens.len()),
    ));
  };

  let class_index = class_token.parse::<i64>().map_err(|_| {
    ErrorRecord::at_line(
      ErrorKind::Format,
      line_no,
      format!("类别编号无法解析: {:?}", class_token),
    )
  })?;
  let x_center = parse_value(xc, "x_center", line_no)?;
  let y_center = parse_value(yc, "y_center", line_no)?;
  let width = parse_value(w, "width", line_no)?;
  let height = parse_value(h, "height", line_no)?;

  let resolved = usize::try_from(class_index)
    .ok()
    .and_then(|index| classes.get(index));
  let (label, warning) = match resolved {
    Some(name) => (name.to_string(), None),
    None => (
      format!("unknown_class_{}", class_index),
      Some(ErrorRecord::at_line(
        ErrorKind::ClassIndexOutOfRange,
        line_no,
        format!("类别编号 {} 超出范围 (共 {} 个类别)", class_index, classes.len()),
      )),
    ),
  };

  let shape = BoundingBox {
    xmin: to_pixel(x_center - width / 2.0, size.width),
    ymin: to_pixel(y_center - height / 2.0, size.height),
    xmax: to_pixel(x_center + width / 2.0, size.width),
    ymax: to_pixel(y_center + height / 2.0, size.height),
    label,
    // 归一化格式不保存 difficult
    difficult: false,
  };
  Ok((shape, warning))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fixture(annotation: &str, classes: Option<&str>) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img.txt");
    std::fs::write(&path, annotation).unwrap();
    if let Some(classes) = classes {
      std::fs::write(dir.path().join("classes.txt"), classes).unwrap();
    }
    (dir, path)
  }

  #[test]
  fn reads_concrete_box() {
    let (_dir, path) = fixture("1 0.500000 0.500000 0.500000 0.800000\n", Some("dog\ncat\n"));
    let reader = AnnotationReader::open(&path, ImageSize::new(200, 100, 3), None).unwrap();

    assert!(reader.errors().is_empty());
    assert_eq!(reader.shapes(), [BoundingBox::new(50, 10, 150, 90, "cat")]);
  }

  #[test]
  fn out_of_range_class_gets_synthesized_label() {
    let (_dir, path) = fixture("9 0.5 0.5 0.2 0.2\n0 0.5 0.5 0.2 0.2\n", Some("a\nb\n"));
    let reader = AnnotationReader::open(&path, ImageSize::new(100, 100, 3), None).unwrap();

    let labels: Vec<&str> = reader.shapes().iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, ["unknown_class_9", "a"]);
    assert_eq!(reader.errors().len(), 1);
    assert_eq!(reader.errors()[0].kind, ErrorKind::ClassIndexOutOfRange);
    assert_eq!(reader.errors()[0].location, crate::label::ErrorLocation::Line(1));
  }

  #[test]
  fn short_line_is_skipped_and_parsing_continues() {
    let (_dir, path) = fixture(
      "0 0.5 0.5 0.2\n\n0 0.5 0.5 0.2 0.2\n0 abc 0.5 0.2 0.2\n",
      Some("a\n"),
    );
    let reader = AnnotationReader::open(&path, ImageSize::new(100, 100, 3), None).unwrap();

    assert_eq!(reader.shapes(), [BoundingBox::new(40, 40, 60, 60, "a")]);
    let kinds: Vec<_> = reader.errors().iter().map(|e| (e.kind, e.location.clone())).collect();
    assert_eq!(
      kinds,
      [
        (ErrorKind::Format, crate::label::ErrorLocation::Line(1)),
        (ErrorKind::Format, crate::label::ErrorLocation::Line(4)),
      ]
    );
  }

  #[test]
  fn extents_are_clamped_to_image() {
    let (_dir, path) = fixture("0 0.05 0.98 0.5 0.1\n", Some("a\n"));
    let reader = AnnotationReader::open(&path, ImageSize::new(200, 100, 3), None).unwrap();

    let shape = &reader.shapes()[0];
    assert_eq!(shape.xmin, 0);
    assert_eq!(shape.xmax, 60);
    assert_eq!(shape.ymax, 100);
  }

  #[test]
  fn missing_class_list_is_recorded_not_fatal() {
    let (dir, path) = fixture("0 0.5 0.5 0.2 0.2\n", None);
    let reader = AnnotationReader::open(&path, ImageSize::new(100, 100, 3), None).unwrap();

    assert_eq!(reader.shapes()[0].label, "unknown_class_0");
    assert_eq!(reader.errors().len(), 2);
    assert_eq!(reader.errors()[0].kind, ErrorKind::Io);
    assert_eq!(
      reader.errors()[0].location,
      crate::label::ErrorLocation::Path(dir.path().join("classes.txt"))
    );
    assert_eq!(reader.errors()[1].kind, ErrorKind::ClassIndexOutOfRange);
  }

  #[test]
  fn explicit_class_list_path_is_used() {
    let (dir, path) = fixture("1 0.5 0.5 0.2 0.2\n", None);
    let custom = dir.path().join("names.list");
    std::fs::write(&custom, "x\ny\n").unwrap();

    let reader = AnnotationReader::open(&path, ImageSize::new(100, 100, 3), Some(&custom)).unwrap();
    assert!(reader.errors().is_empty());
    assert_eq!(reader.shapes()[0].label, "y");
    assert_eq!(reader.class_list_path(), custom.as_path());
  }

  #[test]
  fn missing_annotation_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let result = AnnotationReader::open(&dir.path().join("nope.txt"), ImageSize::new(1, 1, 1), None);
    assert!(matches!(result, Err(CodecError::Io { .. })));
  }
}
