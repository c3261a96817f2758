// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 原始输出张量与跨步视图
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

use thiserror::Error;

use crate::letterbox::FrameSize;

const TENSOR_RANK: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorShapeError {
  #[error("张量维度数错误: 期望 {expected}, 实际 {actual}")]
  Rank { expected: usize, actual: usize },
  #[error("张量数据长度与形状 {dims:?} 不符: 期望 {expected}, 实际 {actual}")]
  Length {
    dims: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("通道数不匹配: 期望 {anchors} x {channels}, 实际 {actual}")]
  Channels {
    anchors: usize,
    channels: usize,
    actual: usize,
  },
  #[error("张量形状 {dims:?} 的元素数溢出")]
  Overflow { dims: Vec<usize> },
  #[error("网格尺寸为 0: {grid_h}x{grid_w}")]
  EmptyGrid { grid_h: usize, grid_w: usize },
}

/// 推理运行时给出的单个输出张量，按行优先连续存放
///
/// 形状为 `[1, anchors * channels, grid_h, grid_w]` 或
/// `[anchors, channels, grid_h, grid_w]`。
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
  dims: Vec<usize>,
  data: Box<[f32]>,
}

impl RawTensor {
  pub fn new(dims: Vec<usize>, data: impl Into<Box<[f32]>>) -> Result<Self, TensorShapeError> {
    let data = data.into();
    let Some(expected) = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)) else {
      return Err(TensorShapeError::Overflow { dims });
    };
    if expected != data.len() {
      return Err(TensorShapeError::Length {
        dims,
        expected,
        actual: data.len(),
      });
    }
    Ok(Self { dims, data })
  }

  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

/// 一帧的全部输出张量及原始帧尺寸
#[derive(Debug, Clone, PartialEq)]
pub struct TensorFrame {
  pub index: u64,
  pub frame: FrameSize,
  pub outputs: Vec<RawTensor>,
  /// 可选的原始帧图像路径，供绘制输出使用
  pub image: Option<std::path::PathBuf>,
}

/// `[anchor, channel, grid_h, grid_w]` 布局的只读跨步视图
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
  data: &'a [f32],
  shape: [usize; TENSOR_RANK],
  strides: [usize; TENSOR_RANK],
}

impl<'a> TensorView<'a> {
  /// 按给定的每格锚框数与通道数解释张量，形状不符时立即失败
  pub fn new(
    tensor: &'a RawTensor,
    anchors: usize,
    channels: usize,
  ) -> Result<Self, TensorShapeError> {
    let dims = tensor.dims();
    if dims.len() != TENSOR_RANK {
      return Err(TensorShapeError::Rank {
        expected: TENSOR_RANK,
        actual: dims.len(),
      });
    }

    let Some(leading) = dims[0].checked_mul(dims[1]) else {
      return Err(TensorShapeError::Overflow {
        dims: dims.to_vec(),
      });
    };
    if Some(leading) != anchors.checked_mul(channels) || (dims[0] != 1 && dims[0] != anchors) {
      return Err(TensorShapeError::Channels {
        anchors,
        channels,
        actual: leading,
      });
    }

    let (grid_h, grid_w) = (dims[2], dims[3]);
    if grid_h == 0 || grid_w == 0 {
      return Err(TensorShapeError::EmptyGrid { grid_h, grid_w });
    }

    let shape = [anchors, channels, grid_h, grid_w];
    let strides = [channels * grid_h * grid_w, grid_h * grid_w, grid_w, 1];

    Ok(Self {
      data: tensor.data(),
      shape,
      strides,
    })
  }

  pub fn anchors(&self) -> usize {
    self.shape[0]
  }

  pub fn channels(&self) -> usize {
    self.shape[1]
  }

  pub fn grid_h(&self) -> usize {
    self.shape[2]
  }

  pub fn grid_w(&self) -> usize {
    self.shape[3]
  }

  pub fn get(&self, anchor: usize, channel: usize, row: usize, col: usize) -> f32 {
    self.data[anchor * self.strides[0]
      + channel * self.strides[1]
      + row * self.strides[2]
      + col * self.strides[3]]
  }

  /// 某锚框某通道的整张 `grid_h * grid_w` 平面，按 `row * grid_w + col` 索引
  pub fn plane(&self, anchor: usize, channel: usize) -> &'a [f32] {
    let start = anchor * self.strides[0] + channel * self.strides[1];
    &self.data[start..start + self.strides[1]]
  }
}
