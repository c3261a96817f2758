// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 输入定义
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

use crate::{FromUrl, FromUrlWithScheme, tensor::TensorFrame};

mod tensor_dump;
pub use self::tensor_dump::{TensorDumpError, TensorDumpInput, write_dump};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("张量转储输入错误: {0}")]
  TensorDumpError(#[from] TensorDumpError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  TensorDump(TensorDumpInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() == TensorDumpInput::SCHEME {
      let input = TensorDumpInput::from_url(url)?;
      return Ok(InputWrapper::TensorDump(input));
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Iterator for InputWrapper {
  type Item = TensorFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::TensorDump(input) => input.next(),
    }
  }
}
