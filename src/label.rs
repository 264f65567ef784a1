// 该文件是 Hongbiao （红标） 项目的一部分。
// src/label.rs - 归一化标注格式读写
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

mod class_list;
mod reader;
mod writer;

use std::{
  fmt,
  io::Write,
  path::{Path, PathBuf},
};

use thiserror::Error;

use crate::input::ImageSize;

pub use class_list::ClassList;
pub use reader::AnnotationReader;
pub use writer::AnnotationWriter;

pub const CLASS_LIST_FILE: &str = "classes.txt";
pub const LABEL_EXTENSION: &str = "txt";

#[derive(Error, Debug)]
pub enum CodecError {
  #[error("I/O 错误: {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("图片尺寸无效: {0}")]
  InvalidImageSize(ImageSize),
}

impl CodecError {
  pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
    CodecError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// 一个像素坐标的标注框
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingBox {
  pub xmin: i32,
  pub ymin: i32,
  pub xmax: i32,
  pub ymax: i32,
  pub label: String,
  pub difficult: bool,
}

impl BoundingBox {
  pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32, label: impl Into<String>) -> Self {
    Self {
      xmin,
      ymin,
      xmax,
      ymax,
      label: label.into(),
      difficult: false,
    }
  }

  pub fn with_difficult(mut self, difficult: bool) -> Self {
    self.difficult = difficult;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Format,
  ClassIndexOutOfRange,
  Io,
  Prediction,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::Format => "FormatError",
      ErrorKind::ClassIndexOutOfRange => "ClassIndexOutOfRange",
      ErrorKind::Io => "IOError",
      ErrorKind::Prediction => "PredictionError",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
  Line(usize),
  Path(PathBuf),
}

impl fmt::Display for ErrorLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorLocation::Line(line) => write!(f, "第 {} 行", line),
      ErrorLocation::Path(path) => write!(f, "{}", path.display()),
    }
  }
}

/// 可恢复的错误记录，按发生顺序累积
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
  pub kind: ErrorKind,
  pub location: ErrorLocation,
  pub message: String,
}

impl ErrorRecord {
  pub fn new(kind: ErrorKind, location: ErrorLocation, message: impl Into<String>) -> Self {
    Self {
      kind,
      location,
      message: message.into(),
    }
  }

  pub fn at_line(kind: ErrorKind, line: usize, message: impl Into<String>) -> Self {
    Self::new(kind, ErrorLocation::Line(line), message)
  }

  pub fn at_path(kind: ErrorKind, path: &Path, message: impl Into<String>) -> Self {
    Self::new(kind, ErrorLocation::Path(path.to_path_buf()), message)
  }
}

impl fmt::Display for ErrorRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
  }
}

/// `save_dir/<stem>.txt`
pub fn label_path_for(image: &Path, save_dir: &Path) -> PathBuf {
  let mut name = image.file_stem().unwrap_or(image.as_os_str()).to_os_string();
  name.push(".");
  name.push(LABEL_EXTENSION);
  save_dir.join(name)
}

pub fn class_list_path(dir: &Path) -> PathBuf {
  dir.join(CLASS_LIST_FILE)
}

/// 先写入同目录的临时文件再替换，失败时不破坏已有文件
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  let mut file = tempfile::NamedTempFile::new_in(dir)?;
  file.write_all(content)?;
  file.flush()?;
  if let Some(permissions) = target_permissions(path) {
    file.as_file().set_permissions(permissions)?;
  }
  file.persist(path)?;
  Ok(())
}

/// 沿用已有文件的权限，新文件在 unix 上为 0644
fn target_permissions(path: &Path) -> Option<std::fs::Permissions> {
  match std::fs::metadata(path) {
    Ok(meta) if meta.is_file() => Some(meta.permissions()),
    _ => default_permissions(),
  }
}

#[cfg(unix)]
fn default_permissions() -> Option<std::fs::Permissions> {
  use std::os::unix::fs::PermissionsExt;
  Some(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<std::fs::Permissions> {
  None
}

/// 读取标注文件，返回标注框与累积的错误
pub fn read_annotation(
  path: &Path,
  size: ImageSize,
) -> Result<(Vec<BoundingBox>, Vec<ErrorRecord>), CodecError> {
  AnnotationReader::open(path, size, None).map(AnnotationReader::into_parts)
}

/// 写入标注文件，同时重写同目录下的类别文件
pub fn write_annotation(
  path: &Path,
  size: ImageSize,
  boxes: &[BoundingBox],
  class_list: &mut ClassList,
) -> Result<(), CodecError> {
  let mut writer = AnnotationWriter::new(size);
  for b in boxes {
    writer.add_annotation(b);
  }
  writer.save(path, class_list)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn label_path_uses_image_stem() {
    let path = label_path_for(Path::new("/data/images/cat.001.jpg"), Path::new("/labels"));
    assert_eq!(path, PathBuf::from("/labels/cat.001.txt"));
  }

  #[test]
  fn round_trip_keeps_labels_and_drops_difficult() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img.txt");
    let size = ImageSize::new(200, 100, 3);
    let boxes = vec![
      BoundingBox::new(50, 10, 150, 90, "cat").with_difficult(true),
      BoundingBox::new(0, 0, 200, 100, "dog"),
      BoundingBox::new(13, 27, 71, 64, "cat"),
    ];

    let mut classes = ClassList::new();
    write_annotation(&path, size, &boxes, &mut classes).unwrap();
    assert_eq!(classes.names(), ["cat", "dog"]);

    let (shapes, errors) = read_annotation(&path, size).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
    let expected: Vec<_> = boxes.into_iter().map(|b| b.with_difficult(false)).collect();
    assert_eq!(shapes, expected);
  }

  #[test]
  fn failed_write_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img.txt");
    write_atomic(&path, b"0 0.5 0.5 0.1 0.1\n").unwrap();

    let missing = dir.path().join("missing").join("img.txt");
    assert!(write_atomic(&missing, b"broken").is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0 0.5 0.5 0.1 0.1\n");
  }

  #[test]
  fn duplicate_class_names_keep_existing_indices() {
    let dir = tempfile::tempdir().unwrap();
    let size = ImageSize::new(100, 100, 3);
    std::fs::write(dir.path().join(CLASS_LIST_FILE), "a\na\nb\n").unwrap();
    let old = dir.path().join("old.txt");
    std::fs::write(&old, "2 0.5 0.5 0.2 0.2\n").unwrap();

    let (shapes, errors) = read_annotation(&old, size).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(shapes[0].label, "b");

    let mut classes = ClassList::load(&dir.path().join(CLASS_LIST_FILE)).unwrap();
    let boxes = vec![BoundingBox::new(10, 10, 20, 20, "c")];
    write_annotation(&dir.path().join("new.txt"), size, &boxes, &mut classes).unwrap();
    assert_eq!(
      std::fs::read_to_string(dir.path().join(CLASS_LIST_FILE)).unwrap(),
      "a\na\nb\nc\n"
    );
    assert!(
      std::fs::read_to_string(dir.path().join("new.txt"))
        .unwrap()
        .starts_with("3 ")
    );

    let (shapes, _) = read_annotation(&old, size).unwrap();
    assert_eq!(shapes[0].label, "b");
  }

  #[cfg(unix)]
  #[test]
  fn written_files_are_readable_by_others() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img.txt");
    let mut classes = ClassList::new();
    let boxes = vec![BoundingBox::new(0, 0, 5, 5, "a")];
    write_annotation(&path, ImageSize::new(10, 10, 3), &boxes, &mut classes).unwrap();

    let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode(&path), 0o644);
    assert_eq!(mode(&dir.path().join(CLASS_LIST_FILE)), 0o644);

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o664)).unwrap();
    write_atomic(&path, b"").unwrap();
    assert_eq!(mode(&path), 0o664);
  }
}
