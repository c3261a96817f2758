// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess.rs - 检测后处理流水线
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

//! 原始输出张量 → 解码 → 分数过滤 → 按类别 NMS → 坐标还原。
//!
//! 每次调用只处理一帧，不保存跨帧状态；[`Postprocessor`] 只持有不可变配置，
//! 可以在多个线程间共享。

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{ConfigError, PostprocessConfig},
  letterbox::{self, FrameSize, LetterboxError, LetterboxTransform, ResizedDims},
  model::{DetectResult, Model},
  tensor::{RawTensor, TensorFrame, TensorShapeError},
};

mod decode;
mod filter;
mod nms;
mod remap;

pub use self::decode::BoxDecoder;
pub use self::filter::filter;
pub use self::nms::nms;
pub use self::remap::remap;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PostprocessError {
  #[error("输出张量数量不匹配: 期望 {expected}, 实际 {actual}")]
  TensorCount { expected: usize, actual: usize },
  #[error("第 {index} 个输出张量形状错误: {source}")]
  Shape {
    index: usize,
    #[source]
    source: TensorShapeError,
  },
  #[error("letterbox 输入尺寸 {transform} 与配置的输入尺寸 {config} 不一致")]
  InputSizeMismatch { transform: u32, config: u32 },
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("letterbox 错误: {0}")]
  Letterbox(#[from] LetterboxError),
}

pub struct Postprocessor {
  config: PostprocessConfig,
}

impl Postprocessor {
  pub fn new(config: PostprocessConfig) -> Self {
    info!(
      "后处理器: {} 个检测头, 输入 {}x{}, 激活约定 {}, 类别数 {}",
      config.num_scales(),
      config.input_size(),
      config.input_size(),
      config.activation(),
      config.num_classes()
    );
    Self { config }
  }

  pub fn config(&self) -> &PostprocessConfig {
    &self.config
  }

  /// 按配置的输入尺寸计算该帧的 letterbox 变换
  pub fn letterbox(
    &self,
    frame: FrameSize,
  ) -> Result<(ResizedDims, LetterboxTransform), PostprocessError> {
    Ok(letterbox::forward(frame, self.config.input_size())?)
  }

  /// 处理一帧的全部输出张量，返回原始帧坐标系下的检测结果
  pub fn process(
    &self,
    outputs: &[RawTensor],
    transform: &LetterboxTransform,
    frame: FrameSize,
  ) -> Result<DetectResult, PostprocessError> {
    if transform.input_size() != self.config.input_size() {
      return Err(PostprocessError::InputSizeMismatch {
        transform: transform.input_size(),
        config: self.config.input_size(),
      });
    }

    let candidates = BoxDecoder::new(&self.config).decode(outputs)?;
    debug!("解码候选框 {} 个", candidates.len());

    let candidates = filter(candidates, self.config.obj_thresh());
    debug!("分数过滤后剩余 {} 个", candidates.len());

    let kept = nms(candidates, self.config.nms_thresh());
    debug!("NMS 后剩余 {} 个", kept.len());

    let items = remap(&kept, transform, frame);
    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }

  /// 输入图像由调用方按 [`Postprocessor::letterbox`] 的同一规则预处理
  pub fn process_frame(
    &self,
    outputs: &[RawTensor],
    frame: FrameSize,
  ) -> Result<DetectResult, PostprocessError> {
    let (_, transform) = self.letterbox(frame)?;
    self.process(outputs, &transform, frame)
  }
}

impl Model for Postprocessor {
  type Input = TensorFrame;
  type Output = DetectResult;
  type Error = PostprocessError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.process_frame(&input.outputs, input.frame)
  }
}
