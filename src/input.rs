// 该文件是 Hongbiao （红标） 项目的一部分。
// src/input.rs - 图像输入
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
  fmt,
  path::{Path, PathBuf},
};

use image::{ImageDecoder, ImageReader};
use thiserror::Error;
use tracing::debug;

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解析错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 图片尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
  pub width: u32,
  pub height: u32,
  pub channels: u32,
}

impl ImageSize {
  pub fn new(width: u32, height: u32, channels: u32) -> Self {
    Self {
      width,
      height,
      channels,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }
}

impl fmt::Display for ImageSize {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}x{}", self.width, self.height, self.channels)
  }
}

/// 图片尺寸来源
pub trait ImageDimensions {
  type Error: std::error::Error + Send + Sync + 'static;

  fn dimensions(&self, path: &Path) -> Result<ImageSize, Self::Error>;
}

/// 只读取文件头获取尺寸，不解码像素
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileDimensions;

impl ImageDimensions for ImageFileDimensions {
  type Error = InputError;

  fn dimensions(&self, path: &Path) -> Result<ImageSize, Self::Error> {
    let decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let (width, height) = decoder.dimensions();
    let channels = decoder.color_type().channel_count() as u32;
    debug!("{}: {}x{}x{}", path.display(), width, height, channels);
    Ok(ImageSize::new(width, height, channels))
  }
}

pub fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      let lower = ext.to_lowercase();
      IMAGE_EXTENSIONS.contains(&lower.as_str())
    })
    .unwrap_or(false)
}

/// 列出目录中的图片文件，按文件名排序
pub fn scan_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
  let mut images = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_file() && is_image_file(&path) {
      images.push(path);
    }
  }
  images.sort();
  debug!("在 {} 中找到 {} 张图片", dir.display(), images.len());
  Ok(images)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_png_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.png");
    image::RgbImage::new(200, 100).save(&path).unwrap();
    let gray = dir.path().join("b.png");
    image::GrayImage::new(3, 4).save(&gray).unwrap();

    assert_eq!(
      ImageFileDimensions.dimensions(&path).unwrap(),
      ImageSize::new(200, 100, 3)
    );
    assert_eq!(
      ImageFileDimensions.dimensions(&gray).unwrap(),
      ImageSize::new(3, 4, 1)
    );
  }

  #[test]
  fn missing_image_is_io_error() {
    let result = ImageFileDimensions.dimensions(Path::new("/no/such/image.png"));
    assert!(matches!(result, Err(InputError::IoError(_))));
  }

  #[test]
  fn scan_filters_by_extension_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.JPG", "a.png", "c.txt", "d.webp"] {
      std::fs::write(dir.path().join(name), b"").unwrap();
    }
    std::fs::create_dir(dir.path().join("e.png")).unwrap();

    let names: Vec<String> = scan_images(dir.path())
      .unwrap()
      .iter()
      .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
      .collect();
    assert_eq!(names, ["a.png", "b.JPG", "d.webp"]);
  }
}
