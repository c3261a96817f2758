// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  labels::ClassTable,
  model::{BBox, DetectResult},
  output::Render,
  tensor::TensorFrame,
};

const BOX_THICKNESS: i32 = 2;

const PALETTE: [[u8; 3]; 8] = [
  [255, 56, 56],
  [255, 157, 151],
  [255, 112, 31],
  [255, 178, 29],
  [72, 249, 10],
  [26, 147, 52],
  [0, 194, 255],
  [52, 69, 147],
];

#[derive(Error, Debug)]
pub enum DrawOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 在帧图像上画出检测框并保存为 PNG
///
/// 没有内嵌字体，标签只写入日志，不绘制文字。
pub struct DrawOutput {
  directory: PathBuf,
  classes: ClassTable,
}

impl FromUrlWithScheme for DrawOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for DrawOutput {
  type Error = DrawOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DrawOutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(DrawOutput {
      directory: PathBuf::from(uri.path()),
      classes: ClassTable::default(),
    })
  }
}

fn class_color(class_id: u32) -> Rgb<u8> {
  Rgb(PALETTE[class_id as usize % PALETTE.len()])
}

/// `bbox` 为原始帧像素坐标
fn draw_bbox(image: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  let x_min = (bbox.x_min.floor() as i32).clamp(0, w - 1);
  let y_min = (bbox.y_min.floor() as i32).clamp(0, h - 1);
  let x_max = (bbox.x_max.ceil() as i32).clamp(0, w - 1);
  let y_max = (bbox.y_max.ceil() as i32).clamp(0, h - 1);

  for t in 0..BOX_THICKNESS {
    let width = x_max - x_min - 2 * t + 1;
    let height = y_max - y_min - 2 * t + 1;
    if width <= 0 || height <= 0 {
      break;
    }
    let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
    draw_hollow_rect_mut(image, rect, color);
  }
}

impl DrawOutput {
  pub fn with_class_table(mut self, classes: ClassTable) -> Self {
    self.classes = classes;
    self
  }

  pub fn classes(&self) -> &ClassTable {
    &self.classes
  }

  /// 优先使用帧记录的源图像，否则画在同尺寸的黑色画布上
  fn canvas(&self, frame: &TensorFrame) -> RgbImage {
    let (width, height) = (frame.frame.width, frame.frame.height);
    if let Some(path) = &frame.image {
      match image::open(path) {
        Ok(image) => return image.to_rgb8(),
        Err(e) => warn!("无法读取源图像 {}: {}, 使用空白画布", path.display(), e),
      }
    }
    RgbImage::new(width, height)
  }

  pub fn draw(&self, frame: &TensorFrame, result: &DetectResult) -> RgbImage {
    let mut image = self.canvas(frame);
    if image.width() == 0 || image.height() == 0 {
      return image;
    }
    for det in result.items.iter() {
      debug!("绘制 {} {:.2}", self.classes.label(det.class_id), det.score);
      draw_bbox(&mut image, &det.bbox, class_color(det.class_id));
    }
    image
  }
}

impl Render<TensorFrame, DetectResult> for DrawOutput {
  type Error = DrawOutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let image = self.draw(frame, result);
    std::fs::create_dir_all(&self.directory)?;
    let path = self.directory.join(format!("{:06}.png", frame.index));
    image.save(&path)?;
    info!("保存图像到文件: {}", path.display());
    Ok(())
  }
}
