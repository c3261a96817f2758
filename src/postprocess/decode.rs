// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/decode.rs - 多尺度网格输出解码
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

use tracing::{debug, error};

use crate::{
  config::{Activation, BoxEncoding, PostprocessConfig},
  model::Candidate,
  postprocess::PostprocessError,
  tensor::{RawTensor, TensorView},
};

const CH_X: usize = 0;
const CH_Y: usize = 1;
const CH_W: usize = 2;
const CH_H: usize = 3;
const CH_OBJ: usize = 4;
const CH_CLS: usize = 5;

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 把每个检测头的输出张量解码为输入空间中的候选框
pub struct BoxDecoder<'a> {
  config: &'a PostprocessConfig,
  objectness_floor: f32,
}

impl<'a> BoxDecoder<'a> {
  /// 目标置信度低于 `obj_thresh` 的格子不会产生候选框：
  /// 类别置信度不超过 1 时，其最终得分必然低于阈值。
  pub fn new(config: &'a PostprocessConfig) -> Self {
    Self {
      config,
      objectness_floor: config.obj_thresh(),
    }
  }

  /// 覆盖目标置信度下限，`0.0` 表示输出所有格子
  pub fn with_objectness_floor(mut self, floor: f32) -> Self {
    self.objectness_floor = floor;
    self
  }

  /// 所有张量的形状都先校验，任一不符即整体失败
  pub fn decode(&self, outputs: &[RawTensor]) -> Result<Vec<Candidate>, PostprocessError> {
    let expected = self.config.num_scales();
    if outputs.len() != expected {
      error!("输出张量数量不匹配: 期望 {}, 实际 {}", expected, outputs.len());
      return Err(PostprocessError::TensorCount {
        expected,
        actual: outputs.len(),
      });
    }

    let channels = self.config.channels();
    let views = outputs
      .iter()
      .enumerate()
      .map(|(index, tensor)| {
        let anchors = self.config.encoding().anchors_per_cell(index);
        TensorView::new(tensor, anchors, channels).map_err(|source| {
          error!("检测头 {}: 形状 {:?} 无效: {}", index, tensor.dims(), source);
          PostprocessError::Shape { index, source }
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let mut candidates = Vec::new();
    for (scale, view) in views.iter().enumerate() {
      let before = candidates.len();
      self.decode_scale(scale, view, &mut candidates);
      debug!(
        "检测头 {}: 网格 {}x{}, 锚框 {}, 候选 {}",
        scale,
        view.grid_h(),
        view.grid_w(),
        view.anchors(),
        candidates.len() - before
      );
    }

    Ok(candidates)
  }

  fn decode_scale(&self, scale: usize, view: &TensorView<'_>, out: &mut Vec<Candidate>) {
    let (grid_h, grid_w) = (view.grid_h(), view.grid_w());
    let input_size = self.config.input_size() as f32;
    let stride_x = input_size / grid_w as f32;
    let stride_y = input_size / grid_h as f32;
    let num_classes = self.config.num_classes();

    let act: fn(f32) -> f32 = match self.config.activation() {
      Activation::Raw => sigmoid,
      Activation::Decoded => std::convert::identity,
    };

    for anchor in 0..view.anchors() {
      let px = view.plane(anchor, CH_X);
      let py = view.plane(anchor, CH_Y);
      let pw = view.plane(anchor, CH_W);
      let ph = view.plane(anchor, CH_H);
      let pobj = view.plane(anchor, CH_OBJ);
      let pcls: Vec<&[f32]> = (0..num_classes)
        .map(|k| view.plane(anchor, CH_CLS + k))
        .collect();

      for row in 0..grid_h {
        for col in 0..grid_w {
          let idx = row * grid_w + col;

          let objectness = act(pobj[idx]);
          if objectness < self.objectness_floor {
            continue;
          }

          let ox = act(px[idx]);
          let oy = act(py[idx]);
          let (cx, cy, w, h) = match self.config.encoding() {
            BoxEncoding::AnchorFree => {
              let (tw, th) = match self.config.activation() {
                Activation::Raw => (pw[idx].exp(), ph[idx].exp()),
                Activation::Decoded => (pw[idx], ph[idx]),
              };
              (
                (col as f32 + ox) * stride_x,
                (row as f32 + oy) * stride_y,
                tw * stride_x,
                th * stride_y,
              )
            }
            BoxEncoding::Anchored(table) => {
              let [anchor_w, anchor_h] = table.anchors(scale)[anchor];
              let tw = act(pw[idx]) * 2.0;
              let th = act(ph[idx]) * 2.0;
              (
                (col as f32 + ox * 2.0 - 0.5) * stride_x,
                (row as f32 + oy * 2.0 - 0.5) * stride_y,
                tw * tw * anchor_w,
                th * th * anchor_h,
              )
            }
          };

          let class_scores: Box<[f32]> = pcls.iter().map(|plane| act(plane[idx])).collect();
          out.push(Candidate::new(cx, cy, w, h, objectness, class_scores));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::{AnchorTable, PostprocessConfig},
    labels::ClassTable,
  };

  fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
  }

  /// 单类单尺度配置
  fn config(activation: Activation, encoding: BoxEncoding) -> PostprocessConfig {
    PostprocessConfig::builder()
      .input_size(32)
      .num_scales(1)
      .activation(activation)
      .encoding(encoding)
      .classes(ClassTable::from_names(["thing"]))
      .build()
      .unwrap()
  }

  /// `[anchors, 6, grid, grid]`，除 `cell` 外的目标置信度都填 `background`
  fn tensor(
    anchors: usize,
    grid: usize,
    background: f32,
    cell: (usize, usize, usize),
    values: [f32; 6],
  ) -> RawTensor {
    let plane = grid * grid;
    let mut data = vec![0.0; anchors * 6 * plane];
    for a in 0..anchors {
      for idx in 0..plane {
        data[a * 6 * plane + CH_OBJ * plane + idx] = background;
      }
    }
    let (a, row, col) = cell;
    for (ch, v) in values.iter().enumerate() {
      data[a * 6 * plane + ch * plane + row * grid + col] = *v;
    }
    RawTensor::new(vec![1, anchors * 6, grid, grid], data).unwrap()
  }

  #[test]
  fn anchor_free_decoded_values() {
    let config = config(Activation::Decoded, BoxEncoding::AnchorFree);
    // 4x4 网格, stride 8
    let t = tensor(1, 4, 0.0, (0, 2, 1), [0.25, 0.5, 2.0, 1.5, 0.8, 0.5]);
    let out = BoxDecoder::new(&config).decode(&[t]).unwrap();
    assert_eq!(out.len(), 1);
    let c = &out[0];
    assert_eq!((c.cx, c.cy, c.w, c.h), (10.0, 20.0, 16.0, 12.0));
    assert!((c.score() - 0.4).abs() < 1e-6);
  }

  #[test]
  fn anchor_free_raw_values_are_activated() {
    let config = config(Activation::Raw, BoxEncoding::AnchorFree);
    let t = tensor(
      1,
      4,
      -10.0,
      (0, 0, 3),
      [logit(0.5), logit(0.75), 2f32.ln(), 0.0, logit(0.9), logit(0.9)],
    );
    let out = BoxDecoder::new(&config).decode(&[t]).unwrap();
    assert_eq!(out.len(), 1);
    let c = &out[0];
    assert!((c.cx - 28.0).abs() < 1e-4);
    assert!((c.cy - 6.0).abs() < 1e-4);
    assert!((c.w - 16.0).abs() < 1e-4);
    assert!((c.h - 8.0).abs() < 1e-4);
    assert!((c.objectness - 0.9).abs() < 1e-5);
    assert!((c.score() - 0.81).abs() < 1e-5);
  }

  #[test]
  fn anchored_yolov5_geometry() {
    let table = AnchorTable::new(vec![vec![[10.0, 13.0], [16.0, 30.0]]]);
    let config = config(Activation::Decoded, BoxEncoding::Anchored(table));
    // 第二个锚框, 2x2 网格, stride 16
    let t = tensor(2, 2, 0.0, (1, 1, 0), [0.5, 0.75, 0.5, 1.0, 0.9, 1.0]);
    let out = BoxDecoder::new(&config).decode(&[t]).unwrap();
    assert_eq!(out.len(), 1);
    let c = &out[0];
    // x = (0 + 1.0 - 0.5) * 16, y = (1 + 1.5 - 0.5) * 16
    assert_eq!((c.cx, c.cy), (8.0, 32.0));
    // w = (2*0.5)^2 * 16, h = (2*1.0)^2 * 30
    assert_eq!((c.w, c.h), (16.0, 120.0));
  }

  #[test]
  fn anchored_raw_logits_are_activated() {
    let table = AnchorTable::new(vec![vec![[10.0, 13.0], [16.0, 30.0]]]);
    let config = config(Activation::Raw, BoxEncoding::Anchored(table));
    let t = tensor(
      2,
      2,
      -10.0,
      (1, 1, 0),
      [0.0, logit(0.75), 0.0, logit(0.75), logit(0.9), logit(0.8)],
    );
    let out = BoxDecoder::new(&config).decode(&[t]).unwrap();
    assert_eq!(out.len(), 1);
    let c = &out[0];
    // x = (0 + 2*0.5 - 0.5) * 16, y = (1 + 2*0.75 - 0.5) * 16
    assert!((c.cx - 8.0).abs() < 1e-4);
    assert!((c.cy - 32.0).abs() < 1e-4);
    // w = (2*0.5)^2 * 16, h = (2*0.75)^2 * 30
    assert!((c.w - 16.0).abs() < 1e-4);
    assert!((c.h - 67.5).abs() < 1e-3);
    assert!((c.score() - 0.72).abs() < 1e-5);
  }

  #[test]
  fn floor_zero_emits_every_cell() {
    let config = config(Activation::Decoded, BoxEncoding::AnchorFree);
    let t = tensor(1, 4, 0.0, (0, 0, 0), [0.0; 6]);
    let out = BoxDecoder::new(&config)
      .with_objectness_floor(0.0)
      .decode(&[t])
      .unwrap();
    assert_eq!(out.len(), 16);
  }

  #[test]
  fn channel_mismatch_is_fatal() {
    let config = config(Activation::Decoded, BoxEncoding::AnchorFree);
    let t = RawTensor::new(vec![1, 7, 2, 2], vec![0.0; 28]).unwrap();
    assert!(matches!(
      BoxDecoder::new(&config).decode(&[t]),
      Err(PostprocessError::Shape { index: 0, .. })
    ));
  }
}
