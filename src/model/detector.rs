// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/detector.rs - 推理运行时与后处理的组合
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
use tracing::debug;

use crate::{
  letterbox::{FrameSize, LetterboxTransform},
  model::{DetectResult, Model},
  postprocess::{PostprocessError, Postprocessor},
  tensor::RawTensor,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 推理运行时：把预处理后的输入映射为各检测头的原始输出张量
pub trait InferenceRuntime {
  type Input;
  type Error: Into<BoxError>;

  fn run(&self, input: &Self::Input) -> Result<Vec<RawTensor>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("推理运行时错误: {0}")]
  Runtime(#[source] BoxError),
  #[error("后处理错误: {0}")]
  Postprocess(#[from] PostprocessError),
}

pub struct Detector<R> {
  runtime: R,
  postprocessor: Postprocessor,
}

impl<R: InferenceRuntime> Detector<R> {
  pub fn new(runtime: R, postprocessor: Postprocessor) -> Self {
    Self {
      runtime,
      postprocessor,
    }
  }

  pub fn postprocessor(&self) -> &Postprocessor {
    &self.postprocessor
  }

  /// `input` 必须已按 `transform` 完成 letterbox
  pub fn detect(
    &self,
    input: &R::Input,
    transform: &LetterboxTransform,
    frame: FrameSize,
  ) -> Result<DetectResult, DetectorError> {
    debug!("执行模型推理");
    let now = std::time::Instant::now();
    let outputs = self
      .runtime
      .run(input)
      .map_err(|e| DetectorError::Runtime(e.into()))?;
    debug!("推理耗时: {:.2?}", now.elapsed());

    let result = self.postprocessor.process(&outputs, transform, frame)?;
    debug!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}

/// 直接接受原始帧图像，先 letterbox 再推理
#[cfg(feature = "letterbox_image")]
impl<R: InferenceRuntime<Input = image::RgbImage>> Model for Detector<R> {
  type Input = image::RgbImage;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let frame = FrameSize::new(input.width(), input.height());
    let (letterboxed, transform) =
      crate::letterbox::letterbox_image(input, self.postprocessor.config().input_size())
        .map_err(PostprocessError::from)?;
    self.detect(&letterboxed, &transform, frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::{Activation, PostprocessConfig}, labels::ClassTable, letterbox};

  /// 固定输出一个位于输入中心的框
  struct FixedRuntime {
    fail: bool,
  }

  #[derive(Debug, Error)]
  #[error("npu offline")]
  struct Offline;

  impl InferenceRuntime for FixedRuntime {
    type Input = ();
    type Error = Offline;

    fn run(&self, _input: &()) -> Result<Vec<RawTensor>, Offline> {
      if self.fail {
        return Err(Offline);
      }
      // 单类、1x1 网格、输入 64: 中心 (32, 32), 宽高 32
      let data = vec![0.5, 0.5, 0.5, 0.5, 0.9, 1.0];
      Ok(vec![RawTensor::new(vec![1, 6, 1, 1], data).unwrap()])
    }
  }

  fn postprocessor() -> Postprocessor {
    Postprocessor::new(
      PostprocessConfig::builder()
        .input_size(64)
        .num_scales(1)
        .activation(Activation::Decoded)
        .classes(ClassTable::from_names(["thing"]))
        .build()
        .unwrap(),
    )
  }

  #[test]
  fn detect_maps_runtime_output_to_frame() {
    let detector = Detector::new(FixedRuntime { fail: false }, postprocessor());
    let frame = FrameSize::new(128, 64);
    let (_, transform) = letterbox::forward(frame, 64).unwrap();
    let result = detector.detect(&(), &transform, frame).unwrap();
    assert_eq!(result.len(), 1);
    // scale 0.5, pad_y 16: x 16..48 -> 32..96, y 16..48 -> 0..64
    let det = &result.items[0];
    assert_eq!((det.left(), det.right()), (32.0, 96.0));
    assert_eq!((det.top(), det.bottom()), (0.0, 64.0));
  }

  #[test]
  fn runtime_failure_is_reported() {
    let detector = Detector::new(FixedRuntime { fail: true }, postprocessor());
    let frame = FrameSize::new(64, 64);
    let (_, transform) = letterbox::forward(frame, 64).unwrap();
    let err = detector.detect(&(), &transform, frame).unwrap_err();
    assert!(matches!(err, DetectorError::Runtime(_)));
    assert!(err.to_string().contains("npu offline"));
  }
}
