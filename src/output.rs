// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, labels::ClassTable, model::DetectResult, tensor::TensorFrame,
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod log_output;
pub use self::log_output::LogOutput;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, RecordFormat, RecordOutputError};

#[cfg(feature = "save_image_file")]
mod draw;
#[cfg(feature = "save_image_file")]
pub use self::draw::{DrawOutput, DrawOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  RecordOutputError(#[from] RecordOutputError),
  #[cfg(feature = "save_image_file")]
  #[error("绘制输出错误: {0}")]
  DrawOutputError(#[from] DrawOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
  #[cfg(feature = "save_image_file")]
  Draw(DrawOutput),
}

impl OutputWrapper {
  /// 替换渲染标签时使用的类别表，默认为 COCO
  pub fn with_class_table(self, classes: ClassTable) -> Self {
    match self {
      OutputWrapper::Log(output) => OutputWrapper::Log(output.with_class_table(classes)),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => {
        OutputWrapper::DirectoryRecord(output.with_class_table(classes))
      }
      #[cfg(feature = "save_image_file")]
      OutputWrapper::Draw(output) => OutputWrapper::Draw(output.with_class_table(classes)),
    }
  }
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME | DirectoryRecordOutput::JSON_SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecord(output))
      }
      #[cfg(feature = "save_image_file")]
      DrawOutput::SCHEME => {
        let output = DrawOutput::from_url(url)?;
        Ok(OutputWrapper::Draw(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<TensorFrame, DetectResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => {
        output.render_result(frame, result).map_err(|e| match e {})
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::Draw(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dispatches_on_scheme() {
    let url = Url::parse("log://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::Log(_))
    ));

    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }

  #[cfg(feature = "save_image_file")]
  #[test]
  fn draw_output_keeps_class_table() {
    let url = Url::parse("image:///tmp/out").unwrap();
    let output = OutputWrapper::from_url(&url)
      .unwrap()
      .with_class_table(ClassTable::from_names(["forklift"]));
    match output {
      OutputWrapper::Draw(draw) => assert_eq!(draw.classes().label(0), "forklift"),
      _ => panic!("expected draw output"),
    }
  }

  #[cfg(feature = "directory_record")]
  #[test]
  fn record_and_json_share_output() {
    for url in ["record:///tmp/out", "json:///tmp/out"] {
      let url = Url::parse(url).unwrap();
      assert!(matches!(
        OutputWrapper::from_url(&url),
        Ok(OutputWrapper::DirectoryRecord(_))
      ));
    }
  }
}
