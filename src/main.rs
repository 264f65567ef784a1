// 该文件是 Hongbiao （红标） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use args::{Args, Command};
use hongbiao::{
  input::{ImageDimensions, ImageFileDimensions, scan_images},
  label::AnnotationReader,
  model::ModelRegistry,
  orchestrator::unlabeled_images,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  match args.command {
    Command::Models { dir, extension } => {
      let mut registry = ModelRegistry::new(&dir).with_extension(&extension);
      let models = registry.scan();
      if models.is_empty() {
        println!("{} 中没有 .{} 模型文件", dir.display(), extension);
      }
      for model in models {
        println!("{}", model.display());
      }
    }
    Command::Unlabeled { images, save_dir } => {
      let images =
        scan_images(&images).with_context(|| format!("无法读取图片目录: {}", images.display()))?;
      let unlabeled = unlabeled_images(&images, &save_dir);
      info!("共 {} 张图片，{} 张未标注", images.len(), unlabeled.len());
      for image in unlabeled {
        println!("{}", image.display());
      }
    }
    Command::Inspect {
      label,
      image,
      classes,
    } => {
      let size = ImageFileDimensions
        .dimensions(&image)
        .with_context(|| format!("无法读取图片尺寸: {}", image.display()))?;
      let reader = AnnotationReader::open(&label, size, classes.as_deref())
        .with_context(|| format!("无法读取标注文件: {}", label.display()))?;

      println!("图片: {} ({})", image.display(), size);
      println!("类别文件: {}", reader.class_list_path().display());
      for shape in reader.shapes() {
        println!(
          "  - {}: ({}, {}) - ({}, {})",
          shape.label, shape.xmin, shape.ymin, shape.xmax, shape.ymax
        );
      }
      if !reader.errors().is_empty() {
        println!("错误 {} 个:", reader.errors().len());
        for error in reader.errors() {
          println!("  ! {}", error);
        }
      }
    }
  }

  Ok(())
}
