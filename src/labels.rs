// 该文件是 Shanan （山南西风） 项目的一部分。
// src/labels.rs - 类别表
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

use std::{path::Path, sync::Arc};

use thiserror::Error;
use tracing::{debug, info};

/// COCO 数据集类别名称，采用官方拼写（`motorcycle`、`tv` 等）
///
/// 需要其它拼写（例如 VOC 风格的 `motorbike`、`tvmonitor`）时用 [`ClassTable::from_path`] 加载。
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum ClassTableError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("类别文件为空: {0}")]
  Empty(String),
}

/// 按下标寻址的只读类别名称表，克隆开销为引用计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
  names: Arc<[String]>,
}

impl Default for ClassTable {
  fn default() -> Self {
    Self::coco()
  }
}

impl ClassTable {
  pub fn coco() -> Self {
    Self::from_names(COCO_CLASSES)
  }

  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  /// 从文本文件读取，每行一个类别，忽略空行与首尾空白
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClassTableError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let table = Self::from_names(
      content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty()),
    );
    if table.is_empty() {
      return Err(ClassTableError::Empty(path.display().to_string()));
    }
    debug!("类别数量: {}", table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  /// 类别名称，越界时返回 "unknown"
  pub fn label(&self, class_id: u32) -> &str {
    self.name(class_id).unwrap_or("unknown")
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}
