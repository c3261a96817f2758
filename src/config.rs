// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 后处理配置
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

use std::{fmt, str::FromStr};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, labels::ClassTable};

pub const DEFAULT_OBJ_THRESH: f32 = 0.5;
pub const DEFAULT_NMS_THRESH: f32 = 0.45;
pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_NUM_SCALES: usize = 3;

/// YOLOv5 COCO 锚框，按检测头 (stride 8, 16, 32) 分组，单位为输入像素
const YOLOV5_ANCHORS: [[[f32; 2]; 3]; 3] = [
  [[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
  [[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
  [[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 无效: {value}, 必须位于 [0, 1]")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("推理输入尺寸无效: {0}")]
  InvalidInputSize(u32),
  #[error("检测头数量无效: {0}")]
  InvalidScaleCount(usize),
  #[error("类别表为空")]
  EmptyClasses,
  #[error("锚框表有 {actual} 个检测头, 配置为 {expected} 个")]
  AnchorScaleMismatch { expected: usize, actual: usize },
  #[error("检测头 {0} 没有锚框")]
  EmptyAnchors(usize),
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("未知的框编码: {0}")]
  UnknownEncoding(String),
  #[error("未知的激活约定: {0}")]
  UnknownActivation(String),
  #[error("参数 {key} 的值无效: {value}")]
  InvalidParameter { key: String, value: String },
}

/// 输出通道是否已在模型内部激活
///
/// 不同导出方式差异很大，必须显式配置：
/// - `Raw`: 坐标偏移、目标置信度与类别置信度需要 sigmoid，尺寸通道需要 exp（无锚框）
///   或 sigmoid（有锚框）。
/// - `Decoded`: 所有通道已经是激活后的值，解码器直接使用。目标与类别置信度应位于
///   `[0, 1]`，否则按目标置信度预筛选可能丢掉得分达标的格子。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
  Raw,
  Decoded,
}

impl FromStr for Activation {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "raw" => Ok(Activation::Raw),
      "decoded" => Ok(Activation::Decoded),
      other => Err(ConfigError::UnknownActivation(other.to_string())),
    }
  }
}

impl fmt::Display for Activation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Activation::Raw => write!(f, "raw"),
      Activation::Decoded => write!(f, "decoded"),
    }
  }
}

/// 每个检测头的锚框尺寸 `[w, h]`
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorTable {
  scales: Box<[Box<[[f32; 2]]>]>,
}

impl AnchorTable {
  pub fn new(scales: Vec<Vec<[f32; 2]>>) -> Self {
    Self {
      scales: scales.into_iter().map(Vec::into_boxed_slice).collect(),
    }
  }

  pub fn yolov5_coco() -> Self {
    Self::new(YOLOV5_ANCHORS.iter().map(|s| s.to_vec()).collect())
  }

  pub fn num_scales(&self) -> usize {
    self.scales.len()
  }

  pub fn anchors(&self, scale: usize) -> &[[f32; 2]] {
    self.scales.get(scale).map(|s| &s[..]).unwrap_or(&[])
  }
}

/// 框编码方式
#[derive(Debug, Clone, PartialEq)]
pub enum BoxEncoding {
  /// 每格一个预测，`w = exp(t) * stride`
  AnchorFree,
  /// YOLOv5 风格，`xy = (2σ - 0.5 + grid) * stride`，`wh = (2σ)² * anchor`
  Anchored(AnchorTable),
}

impl BoxEncoding {
  pub fn anchors_per_cell(&self, scale: usize) -> usize {
    match self {
      BoxEncoding::AnchorFree => 1,
      BoxEncoding::Anchored(table) => table.anchors(scale).len(),
    }
  }

  fn name(&self) -> &'static str {
    match self {
      BoxEncoding::AnchorFree => "anchor-free",
      BoxEncoding::Anchored(_) => "anchored",
    }
  }
}

/// 一个后处理实例的不可变配置
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
  obj_thresh: f32,
  nms_thresh: f32,
  input_size: u32,
  num_scales: usize,
  activation: Activation,
  encoding: BoxEncoding,
  classes: ClassTable,
}

impl Default for PostprocessConfig {
  fn default() -> Self {
    Self {
      obj_thresh: DEFAULT_OBJ_THRESH,
      nms_thresh: DEFAULT_NMS_THRESH,
      input_size: DEFAULT_INPUT_SIZE,
      num_scales: DEFAULT_NUM_SCALES,
      activation: Activation::Raw,
      encoding: BoxEncoding::AnchorFree,
      classes: ClassTable::coco(),
    }
  }
}

impl PostprocessConfig {
  pub fn builder() -> PostprocessConfigBuilder {
    PostprocessConfigBuilder::default()
  }

  /// RKNN 导出的 YOLOv5：三头九锚框，sigmoid 已在模型内完成
  pub fn yolov5() -> PostprocessConfigBuilder {
    PostprocessConfigBuilder::default()
      .encoding(BoxEncoding::Anchored(AnchorTable::yolov5_coco()))
      .activation(Activation::Decoded)
  }

  pub fn obj_thresh(&self) -> f32 {
    self.obj_thresh
  }

  pub fn nms_thresh(&self) -> f32 {
    self.nms_thresh
  }

  pub fn input_size(&self) -> u32 {
    self.input_size
  }

  pub fn num_scales(&self) -> usize {
    self.num_scales
  }

  pub fn activation(&self) -> Activation {
    self.activation
  }

  pub fn encoding(&self) -> &BoxEncoding {
    &self.encoding
  }

  pub fn classes(&self) -> &ClassTable {
    &self.classes
  }

  pub fn num_classes(&self) -> usize {
    self.classes.len()
  }

  /// 每个预测的通道数: 4 (框) + 1 (目标) + 类别数
  pub fn channels(&self) -> usize {
    5 + self.classes.len()
  }
}

#[derive(Debug, Clone, Default)]
pub struct PostprocessConfigBuilder {
  config: PostprocessConfig,
}

impl PostprocessConfigBuilder {
  pub fn obj_thresh(mut self, thresh: f32) -> Self {
    self.config.obj_thresh = thresh;
    self
  }

  pub fn nms_thresh(mut self, thresh: f32) -> Self {
    self.config.nms_thresh = thresh;
    self
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.config.input_size = size;
    self
  }

  pub fn num_scales(mut self, scales: usize) -> Self {
    self.config.num_scales = scales;
    self
  }

  pub fn activation(mut self, activation: Activation) -> Self {
    self.config.activation = activation;
    self
  }

  pub fn encoding(mut self, encoding: BoxEncoding) -> Self {
    self.config.encoding = encoding;
    self
  }

  pub fn classes(mut self, classes: ClassTable) -> Self {
    self.config.classes = classes;
    self
  }

  pub fn build(self) -> Result<PostprocessConfig, ConfigError> {
    let config = self.config;

    for (name, value) in [
      ("obj_thresh", config.obj_thresh),
      ("nms_thresh", config.nms_thresh),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidThreshold { name, value });
      }
    }
    if config.input_size == 0 {
      return Err(ConfigError::InvalidInputSize(config.input_size));
    }
    if config.num_scales == 0 {
      return Err(ConfigError::InvalidScaleCount(config.num_scales));
    }
    if config.classes.is_empty() {
      return Err(ConfigError::EmptyClasses);
    }
    if let BoxEncoding::Anchored(table) = &config.encoding {
      if table.num_scales() != config.num_scales {
        return Err(ConfigError::AnchorScaleMismatch {
          expected: config.num_scales,
          actual: table.num_scales(),
        });
      }
      if let Some(scale) = (0..table.num_scales()).find(|&s| table.anchors(s).is_empty()) {
        return Err(ConfigError::EmptyAnchors(scale));
      }
    }

    debug!(
      "后处理配置: 编码 {}, 激活 {}, 输入 {}, 阈值 {}/{}, 类别 {}",
      config.encoding.name(),
      config.activation,
      config.input_size,
      config.obj_thresh,
      config.nms_thresh,
      config.classes.len()
    );
    Ok(config)
  }
}

fn parse_param<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidParameter {
    key: key.to_string(),
    value: value.to_string(),
  })
}

impl FromUrlWithScheme for PostprocessConfigBuilder {
  const SCHEME: &'static str = "postprocess";
}

/// 形如 `postprocess://yolov5?obj_thresh=0.5&nms_thresh=0.45&input_size=640&activation=decoded`
impl FromUrl for PostprocessConfigBuilder {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConfigError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = match url.host_str().unwrap_or("anchor-free") {
      "anchor-free" | "" => PostprocessConfig::builder(),
      "yolov5" => PostprocessConfig::yolov5(),
      other => return Err(ConfigError::UnknownEncoding(other.to_string())),
    };

    for (key, value) in url.query_pairs() {
      builder = match &*key {
        "obj_thresh" => builder.obj_thresh(parse_param(&key, &value)?),
        "nms_thresh" => builder.nms_thresh(parse_param(&key, &value)?),
        "input_size" => builder.input_size(parse_param(&key, &value)?),
        "scales" => builder.num_scales(parse_param(&key, &value)?),
        "activation" => builder.activation(value.parse()?),
        other => {
          warn!("忽略未知的配置参数: {}={}", other, value);
          builder
        }
      };
    }

    Ok(builder)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_follow_deployment_constants() {
    let config = PostprocessConfig::builder().build().unwrap();
    assert_eq!(config.obj_thresh(), 0.5);
    assert_eq!(config.nms_thresh(), 0.45);
    assert_eq!(config.input_size(), 640);
    assert_eq!(config.num_scales(), 3);
    assert_eq!(config.channels(), 85);
    assert_eq!(config.encoding().anchors_per_cell(0), 1);
  }

  #[test]
  fn yolov5_preset_uses_three_anchors() {
    let config = PostprocessConfig::yolov5().build().unwrap();
    assert_eq!(config.activation(), Activation::Decoded);
    assert_eq!(config.encoding().anchors_per_cell(2), 3);
    match config.encoding() {
      BoxEncoding::Anchored(table) => assert_eq!(table.anchors(2)[2], [373.0, 326.0]),
      other => panic!("unexpected encoding {other:?}"),
    }
  }

  #[test]
  fn rejects_invalid_values() {
    assert!(matches!(
      PostprocessConfig::builder().obj_thresh(1.5).build(),
      Err(ConfigError::InvalidThreshold { name: "obj_thresh", .. })
    ));
    assert_eq!(
      PostprocessConfig::builder().input_size(0).build(),
      Err(ConfigError::InvalidInputSize(0))
    );
    assert_eq!(
      PostprocessConfig::builder()
        .classes(ClassTable::from_names(Vec::<String>::new()))
        .build(),
      Err(ConfigError::EmptyClasses)
    );
    assert_eq!(
      PostprocessConfig::yolov5().num_scales(2).build(),
      Err(ConfigError::AnchorScaleMismatch {
        expected: 2,
        actual: 3
      })
    );
  }

  #[test]
  fn parses_url() {
    let url = Url::parse(
      "postprocess://yolov5?obj_thresh=0.25&nms_thresh=0.5&input_size=320&activation=raw",
    )
    .unwrap();
    let config = PostprocessConfigBuilder::from_url(&url)
      .unwrap()
      .build()
      .unwrap();
    assert_eq!(config.obj_thresh(), 0.25);
    assert_eq!(config.nms_thresh(), 0.5);
    assert_eq!(config.input_size(), 320);
    assert_eq!(config.activation(), Activation::Raw);
    assert!(matches!(config.encoding(), BoxEncoding::Anchored(_)));

    let url = Url::parse("postprocess://anchor-free").unwrap();
    let config = PostprocessConfigBuilder::from_url(&url)
      .unwrap()
      .build()
      .unwrap();
    assert_eq!(config.encoding(), &BoxEncoding::AnchorFree);
  }

  #[test]
  fn url_errors() {
    let url = Url::parse("yolo26:///model.rknn").unwrap();
    assert!(matches!(
      PostprocessConfigBuilder::from_url(&url),
      Err(ConfigError::SchemeMismatch { .. })
    ));
    let url = Url::parse("postprocess://ssd").unwrap();
    assert_eq!(
      PostprocessConfigBuilder::from_url(&url).unwrap_err(),
      ConfigError::UnknownEncoding("ssd".to_string())
    );
    let url = Url::parse("postprocess://yolov5?obj_thresh=high").unwrap();
    assert!(matches!(
      PostprocessConfigBuilder::from_url(&url),
      Err(ConfigError::InvalidParameter { .. })
    ));
    let url = Url::parse("postprocess://yolov5?activation=tanh").unwrap();
    assert!(matches!(
      PostprocessConfigBuilder::from_url(&url),
      Err(ConfigError::UnknownActivation(_))
    ));
  }
}
