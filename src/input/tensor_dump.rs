// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/tensor_dump.rs - 原始输出张量转储文件输入
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

//! 转储文件为 JSON：
//!
//! ```json
//! { "frames": [ { "width": 640, "height": 480, "image": "frame.jpg",
//!                 "outputs": [ { "dims": [1, 255, 80, 80], "data": [ ... ] } ] } ] }
//! ```
//!
//! 便于在没有 NPU 的机器上复现后处理。

use std::{collections::VecDeque, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  letterbox::FrameSize,
  tensor::{RawTensor, TensorFrame, TensorShapeError},
};

#[derive(Error, Debug)]
pub enum TensorDumpError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("第 {frame} 帧第 {output} 个张量无效: {source}")]
  InvalidTensor {
    frame: usize,
    output: usize,
    #[source]
    source: TensorShapeError,
  },
}

#[derive(Serialize, Deserialize)]
struct DumpFile {
  frames: Vec<DumpFrame>,
}

#[derive(Serialize, Deserialize)]
struct DumpFrame {
  width: u32,
  height: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  image: Option<PathBuf>,
  outputs: Vec<DumpTensor>,
}

#[derive(Serialize, Deserialize)]
struct DumpTensor {
  dims: Vec<usize>,
  data: Vec<f32>,
}

pub struct TensorDumpInput {
  frames: VecDeque<TensorFrame>,
}

impl FromUrlWithScheme for TensorDumpInput {
  const SCHEME: &'static str = "dump";
}

impl FromUrl for TensorDumpInput {
  type Error = TensorDumpError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorDumpError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl TensorDumpInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, TensorDumpError> {
    let path = path.as_ref();
    info!("读取张量转储: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let dump: DumpFile = serde_json::from_str(&content)?;

    let frames = dump
      .frames
      .into_iter()
      .enumerate()
      .map(|(index, frame)| {
        let outputs = frame
          .outputs
          .into_iter()
          .enumerate()
          .map(|(output, t)| {
            RawTensor::new(t.dims, t.data).map_err(|source| TensorDumpError::InvalidTensor {
              frame: index,
              output,
              source,
            })
          })
          .collect::<Result<Vec<_>, _>>()?;
        Ok(TensorFrame {
          index: index as u64,
          frame: FrameSize::new(frame.width, frame.height),
          outputs,
          image: frame.image,
        })
      })
      .collect::<Result<VecDeque<_>, TensorDumpError>>()?;

    info!("共 {} 帧", frames.len());
    Ok(Self { frames })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl Iterator for TensorDumpInput {
  type Item = TensorFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frames.pop_front()
  }
}

/// 把若干帧写成转储文件
pub fn write_dump(path: impl AsRef<Path>, frames: &[TensorFrame]) -> Result<(), TensorDumpError> {
  let dump = DumpFile {
    frames: frames
      .iter()
      .map(|f| DumpFrame {
        width: f.frame.width,
        height: f.frame.height,
        image: f.image.clone(),
        outputs: f
          .outputs
          .iter()
          .map(|t| DumpTensor {
            dims: t.dims().to_vec(),
            data: t.data().to_vec(),
          })
          .collect(),
      })
      .collect(),
  };
  let file = std::fs::File::create(path)?;
  serde_json::to_writer(std::io::BufWriter::new(file), &dump)?;
  Ok(())
}
