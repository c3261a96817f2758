// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, labels::ClassTable, model::DetectResult, output::Render,
  tensor::TensorFrame,
};

/// 把检测结果逐条写入日志
#[derive(Default)]
pub struct LogOutput {
  classes: ClassTable,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = super::OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(super::OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::default())
  }
}

impl LogOutput {
  pub fn with_class_table(mut self, classes: ClassTable) -> Self {
    self.classes = classes;
    self
  }
}

impl Render<TensorFrame, DetectResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    info!(
      "第 {} 帧 ({}x{}): {} 个检测结果",
      frame.index,
      frame.frame.width,
      frame.frame.height,
      result.len()
    );
    for det in result.items.iter() {
      info!(
        "  {} @ ({:.0} {:.0} {:.0} {:.0}) {:.3}",
        self.classes.label(det.class_id),
        det.left(),
        det.top(),
        det.right(),
        det.bottom(),
        det.score
      );
    }
    Ok(())
  }
}
