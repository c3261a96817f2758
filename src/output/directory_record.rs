// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  labels::ClassTable,
  model::{BBox, DetectResult},
  output::Render,
  tensor::TensorFrame,
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  /// 每行 `name, score, x1, y1, x2, y2`
  Text { label_with_name: bool },
  Json,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  index: u64,
  width: u32,
  height: u32,
  detections: Vec<DetectionRecord<'a>>,
}

#[derive(Serialize)]
struct DetectionRecord<'a> {
  label: &'a str,
  class_id: u32,
  score: f32,
  bbox: BBox,
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  format: RecordFormat,
  classes: ClassTable,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "record";
}

impl DirectoryRecordOutput {
  pub const JSON_SCHEME: &'static str = "json";

  pub fn new(directory: impl Into<PathBuf>, format: RecordFormat) -> Self {
    Self {
      directory: directory.into(),
      format,
      classes: ClassTable::default(),
      always: false,
    }
  }

  pub fn with_class_table(mut self, classes: ClassTable) -> Self {
    self.classes = classes;
    self
  }

  /// 没有检测结果的帧也写出记录
  pub fn always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn format(&self) -> RecordFormat {
    self.format
  }

  fn frame_path(&self, index: u64) -> PathBuf {
    let ext = match self.format {
      RecordFormat::Text { .. } => "txt",
      RecordFormat::Json => "json",
    };
    self.directory.join(format!("{:06}.{}", index, ext))
  }

  fn text_record(&self, result: &DetectResult, label_with_name: bool) -> String {
    result
      .items
      .iter()
      .map(|det| {
        let name = if label_with_name {
          self.classes.label(det.class_id).to_string()
        } else {
          det.class_id.to_string()
        };
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          name,
          det.score,
          det.left(),
          det.top(),
          det.right(),
          det.bottom()
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  fn json_record(&self, frame: &TensorFrame, result: &DetectResult) -> Result<String, serde_json::Error> {
    let record = FrameRecord {
      index: frame.index,
      width: frame.frame.width,
      height: frame.frame.height,
      detections: result
        .items
        .iter()
        .map(|det| DetectionRecord {
          label: self.classes.label(det.class_id),
          class_id: det.class_id,
          score: det.score,
          bbox: det.bbox,
        })
        .collect(),
    };
    serde_json::to_string_pretty(&record)
  }
}

impl FromUrl for DirectoryRecordOutput {
  type Error = RecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    let format = match uri.scheme() {
      Self::SCHEME => {
        let label_with_name = !uri.query_pairs().any(|(k, v)| k == "label" && v == "id");
        RecordFormat::Text { label_with_name }
      }
      Self::JSON_SCHEME => RecordFormat::Json,
      other => {
        error!("URI scheme mismatch: expected '{}', found '{}'", Self::SCHEME, other);
        return Err(RecordOutputError::SchemeMismatch);
      }
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(Self::new(uri.path(), format).always(always))
  }
}

impl Render<TensorFrame, DetectResult> for DirectoryRecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() && !self.always {
      return Ok(());
    }

    std::fs::create_dir_all(&self.directory)?;
    let path = self.frame_path(frame.index);
    let content = match self.format {
      RecordFormat::Text { label_with_name } => self.text_record(result, label_with_name),
      RecordFormat::Json => self.json_record(frame, result)?,
    };
    std::fs::write(&path, content)?;
    debug!("写入检测记录: {}", path.display());
    Ok(())
  }
}
