// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测数据结构与推理运行时接口
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

use serde::Serialize;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 轴对齐边界框，约定为 `(x_min, y_min, x_max, y_max)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

impl BBox {
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self {
      x_min: cx - w / 2.0,
      y_min: cy - h / 2.0,
      x_max: cx + w / 2.0,
      y_max: cy + h / 2.0,
    }
  }

  /// 交换颠倒的角点，使 `x_min <= x_max`、`y_min <= y_max`
  pub fn normalized(self) -> Self {
    Self {
      x_min: self.x_min.min(self.x_max),
      y_min: self.y_min.min(self.y_max),
      x_max: self.x_min.max(self.x_max),
      y_max: self.y_min.max(self.y_max),
    }
  }

  pub fn width(&self) -> f32 {
    (self.x_max - self.x_min).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.y_max - self.y_min).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// 交并比，任一框面积为 0 时返回 0
  pub fn iou(&self, other: &BBox) -> f32 {
    let a = self.normalized();
    let b = other.normalized();

    let x1 = a.x_min.max(b.x_min);
    let y1 = a.y_min.max(b.y_min);
    let x2 = a.x_max.min(b.x_max);
    let y2 = a.y_max.min(b.y_max);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if a.area() > 0.0 && b.area() > 0.0 && union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 解码产生的候选框，坐标位于推理输入空间
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub objectness: f32,
  pub class_scores: Box<[f32]>,
  class_id: u32,
  score: f32,
}

impl Candidate {
  /// `class_scores` 为各类别置信度，类别与得分取 `objectness * class_scores[k]` 的最大项
  pub fn new(cx: f32, cy: f32, w: f32, h: f32, objectness: f32, class_scores: Box<[f32]>) -> Self {
    let (class_id, score) = argmax(class_scores.iter().map(|&conf| objectness * conf));
    Self {
      cx,
      cy,
      w,
      h,
      objectness,
      class_scores,
      class_id,
      score,
    }
  }

  pub fn class_id(&self) -> u32 {
    self.class_id
  }

  pub fn score(&self) -> f32 {
    self.score
  }

  pub fn bbox(&self) -> BBox {
    BBox::from_center(self.cx, self.cy, self.w, self.h)
  }
}

/// 最大值及其下标，相等时取最先出现者
fn argmax(values: impl Iterator<Item = f32>) -> (u32, f32) {
  let mut best: Option<(u32, f32)> = None;
  for (idx, v) in values.enumerate() {
    if best.is_none_or(|(_, b)| v > b) {
      best = Some((idx as u32, v));
    }
  }
  best.unwrap_or((0, 0.0))
}

/// 原始帧坐标系下的最终检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: BBox,
  pub class_id: u32,
  pub score: f32,
}

impl Detection {
  pub fn left(&self) -> f32 {
    self.bbox.x_min
  }

  pub fn top(&self) -> f32 {
    self.bbox.y_min
  }

  pub fn right(&self) -> f32 {
    self.bbox.x_max
  }

  pub fn bottom(&self) -> f32 {
    self.bbox.y_max
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

mod detector;
pub use self::detector::{Detector, DetectorError, InferenceRuntime};
