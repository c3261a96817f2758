// 该文件是 Shanan （山南西风） 项目的一部分。
// src/letterbox.rs - Letterbox 几何变换
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

//! 将任意尺寸的帧等比缩放并居中填充到正方形推理输入，以及其逆变换。
//!
//! 本模块只计算几何参数，实际的像素缩放由图像处理协作方完成
//! （开启 `letterbox_image` 特性时可使用 [`letterbox_image`]）。

use thiserror::Error;
use tracing::debug;

use crate::model::BBox;

/// 原始采集帧的尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
  pub width: u32,
  pub height: u32,
}

impl FrameSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

/// 缩放后（填充前）的图像尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizedDims {
  pub width: u32,
  pub height: u32,
}

/// 四边的整数填充像素数
///
/// 奇数余量时，前沿（上/左）取下取整，后沿（下/右）取上取整。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
  pub top: u32,
  pub bottom: u32,
  pub left: u32,
  pub right: u32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LetterboxError {
  #[error("帧尺寸无效: {0}x{1}")]
  InvalidFrame(u32, u32),
  #[error("推理输入尺寸无效: {0}")]
  InvalidInputSize(u32),
  #[error("缩放比例无效: {0}")]
  InvalidScale(f32),
  #[error("填充量无效: pad_x={pad_x}, pad_y={pad_y}, 输入尺寸 {input_size}")]
  InvalidPadding {
    pad_x: f32,
    pad_y: f32,
    input_size: u32,
  },
}

/// 一帧的 letterbox 变换参数，构造后不可变
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
  input_size: u32,
}

impl LetterboxTransform {
  /// 由已知参数构造变换，`scale` 必须为正，填充量必须落在 `[0, input_size/2)` 内
  pub fn new(scale: f32, pad_x: f32, pad_y: f32, input_size: u32) -> Result<Self, LetterboxError> {
    if input_size == 0 {
      return Err(LetterboxError::InvalidInputSize(input_size));
    }
    if !(scale.is_finite() && scale > 0.0) {
      return Err(LetterboxError::InvalidScale(scale));
    }
    let half = input_size as f32 / 2.0;
    let pad_ok = |p: f32| p.is_finite() && (0.0..half).contains(&p);
    if !pad_ok(pad_x) || !pad_ok(pad_y) {
      return Err(LetterboxError::InvalidPadding {
        pad_x,
        pad_y,
        input_size,
      });
    }

    Ok(Self {
      scale,
      pad_x,
      pad_y,
      input_size,
    })
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn pad_x(&self) -> f32 {
    self.pad_x
  }

  pub fn pad_y(&self) -> f32 {
    self.pad_y
  }

  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  /// 缩放后的图像尺寸
  pub fn resized(&self) -> ResizedDims {
    let size = self.input_size as f32;
    ResizedDims {
      width: (size - 2.0 * self.pad_x).round() as u32,
      height: (size - 2.0 * self.pad_y).round() as u32,
    }
  }

  /// 整数填充，四边之和加上缩放尺寸恰好等于输入尺寸
  pub fn padding(&self) -> Padding {
    Padding {
      top: (self.pad_y - 0.1).round() as u32,
      bottom: (self.pad_y + 0.1).round() as u32,
      left: (self.pad_x - 0.1).round() as u32,
      right: (self.pad_x + 0.1).round() as u32,
    }
  }

  /// 原始帧坐标 -> 推理输入坐标
  pub fn forward_point(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
  }

  /// 推理输入坐标 -> 原始帧坐标，结果裁剪到帧范围内
  pub fn reverse_point(&self, x: f32, y: f32, frame: FrameSize) -> (f32, f32) {
    let rx = (x - self.pad_x) / self.scale;
    let ry = (y - self.pad_y) / self.scale;
    (
      rx.clamp(0.0, frame.width as f32),
      ry.clamp(0.0, frame.height as f32),
    )
  }

  pub fn forward_box(&self, bbox: &BBox) -> BBox {
    let (x_min, y_min) = self.forward_point(bbox.x_min, bbox.y_min);
    let (x_max, y_max) = self.forward_point(bbox.x_max, bbox.y_max);
    BBox {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  /// 对两个角点分别做逆变换，不调整角点顺序
  pub fn reverse_box(&self, bbox: &BBox, frame: FrameSize) -> BBox {
    let (x_min, y_min) = self.reverse_point(bbox.x_min, bbox.y_min, frame);
    let (x_max, y_max) = self.reverse_point(bbox.x_max, bbox.y_max, frame);
    BBox {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }
}

/// 计算把 `frame` 放入 `input_size × input_size` 输入的缩放与填充
pub fn forward(
  frame: FrameSize,
  input_size: u32,
) -> Result<(ResizedDims, LetterboxTransform), LetterboxError> {
  if frame.width == 0 || frame.height == 0 {
    return Err(LetterboxError::InvalidFrame(frame.width, frame.height));
  }
  if input_size == 0 {
    return Err(LetterboxError::InvalidInputSize(input_size));
  }

  let target = input_size as f32;
  let scale = f32::min(
    target / frame.width as f32,
    target / frame.height as f32,
  );

  // 极端长宽比下短边可能舍入为 0
  let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, input_size);
  let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, input_size);

  let pad_x = (input_size - new_w) as f32 / 2.0;
  let pad_y = (input_size - new_h) as f32 / 2.0;

  debug!(
    "letterbox: {}x{} -> {}x{}, 缩放 {:.4}, 填充 ({:.1}, {:.1})",
    frame.width, frame.height, new_w, new_h, scale, pad_x, pad_y
  );

  let transform = LetterboxTransform::new(scale, pad_x, pad_y, input_size)?;
  Ok((
    ResizedDims {
      width: new_w,
      height: new_h,
    },
    transform,
  ))
}

/// 逆变换单个框
pub fn reverse(bbox: &BBox, transform: &LetterboxTransform, frame: FrameSize) -> BBox {
  transform.reverse_box(bbox, frame)
}

#[cfg(feature = "letterbox_image")]
pub const LETTERBOX_FILL: [u8; 3] = [0, 0, 0];

/// 对 RGB 图像执行缩放与黑边填充，返回推理输入图像及其变换
#[cfg(feature = "letterbox_image")]
pub fn letterbox_image(
  image: &image::RgbImage,
  input_size: u32,
) -> Result<(image::RgbImage, LetterboxTransform), LetterboxError> {
  use image::{Rgb, RgbImage, imageops};

  let frame = FrameSize::new(image.width(), image.height());
  let (dims, transform) = forward(frame, input_size)?;

  let resized;
  let source = if (dims.width, dims.height) != image.dimensions() {
    resized = imageops::resize(
      image,
      dims.width,
      dims.height,
      imageops::FilterType::Triangle,
    );
    &resized
  } else {
    image
  };

  let padding = transform.padding();
  let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb(LETTERBOX_FILL));
  imageops::replace(
    &mut canvas,
    source,
    padding.left as i64,
    padding.top as i64,
  );

  Ok((canvas, transform))
}
