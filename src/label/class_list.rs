// 该文件是 Hongbiao （红标） 项目的一部分。
// src/label/class_list.rs - 类别列表
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

use tracing::{debug, warn};

/// 有序的类别名称，下标即类别编号
///
/// 只允许追加，已分配的编号不会改变。从文件读取时保留重复项的位置，
/// 新类别只在未出现过时追加。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassList {
  names: Vec<String>,
}

impl ClassList {
  pub fn new() -> Self {
    Self::default()
  }

  /// 读取类别文件，只忽略空行，其余行按原样保留位置
  pub fn load(path: &Path) -> std::io::Result<Self> {
    let content = std::fs::read_to_string(path)?;
    let names: Vec<String> = content
      .lines()
      .map(|line| line.trim_end_matches('\r'))
      .filter(|line| !line.trim().is_empty())
      .map(str::to_string)
      .collect();
    let duplicated = names
      .iter()
      .enumerate()
      .filter(|(i, name)| names[..*i].contains(name))
      .count();
    if duplicated > 0 {
      warn!("{} 中有 {} 个重复类别，按首次出现的编号写入", path.display(), duplicated);
    }
    let list = ClassList { names };
    debug!("从 {} 读取 {} 个类别", path.display(), list.len());
    Ok(list)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  /// 返回类别编号，未出现过的类别追加到末尾
  pub fn index_or_insert(&mut self, name: &str) -> usize {
    match self.index_of(name) {
      Some(index) => index,
      None => {
        debug!("新增类别: {} -> {}", name, self.names.len());
        self.names.push(name.to_string());
        self.names.len() - 1
      }
    }
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }

  /// 每行一个类别，以换行结尾
  pub fn to_file_content(&self) -> String {
    self.names.iter().fold(String::new(), |mut out, name| {
      out.push_str(name);
      out.push('\n');
      out
    })
  }
}

impl<S: AsRef<str>> FromIterator<S> for ClassList {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut list = ClassList::new();
    for name in iter {
      let name = name.as_ref().trim();
      if !name.is_empty() {
        list.index_or_insert(name);
      }
    }
    list
  }
}
