// 该文件是 Hongbiao （红标） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Hongbiao 标注工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 列出目录中的模型文件
  Models {
    /// 模型目录
    #[arg(long, value_name = "DIR", default_value = ".")]
    dir: PathBuf,
    /// 模型文件扩展名
    #[arg(long, value_name = "EXT", default_value = hongbiao::model::DEFAULT_MODEL_EXTENSION)]
    extension: String,
  },
  /// 列出还没有标注文件的图片
  Unlabeled {
    /// 图片目录
    #[arg(long, value_name = "DIR")]
    images: PathBuf,
    /// 标注保存目录
    #[arg(long, value_name = "DIR")]
    save_dir: PathBuf,
  },
  /// 读取一张图片的标注并输出解析错误
  Inspect {
    /// 标注文件路径
    #[arg(long, value_name = "FILE")]
    label: PathBuf,
    /// 对应的图片文件
    #[arg(long, value_name = "FILE")]
    image: PathBuf,
    /// 类别文件路径（默认为标注文件同目录下的 classes.txt）
    #[arg(long, value_name = "FILE")]
    classes: Option<PathBuf>,
  },
}
