// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/decode_dump.rs - 对张量转储文件执行检测后处理
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

use anyhow::Result;
use clap::{Parser, ValueEnum};
use url::Url;

use shanan_postprocess::{
  ClassTable, FromUrl, Postprocessor,
  config::PostprocessConfigBuilder,
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, OneShotTask, RepeatShotTask, Task},
};
use tracing::info;

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Mode {
  /// 只处理第一帧
  Oneshot,
  /// 对第一帧重复处理并统计耗时
  Repeat,
  /// 依次处理所有帧
  Continuous,
}

/// 检测后处理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后处理配置，例如 postprocess://yolov5?obj_thresh=0.5&activation=decoded
  #[arg(long, value_name = "CONFIG", default_value = "postprocess://anchor-free")]
  pub config: Url,
  /// 张量转储文件，例如 dump:///data/frames.json
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出：log://、record://<dir>、json://<dir> 或 image://<dir>
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 类别名称文件，每行一个；缺省为 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  #[arg(long, value_enum, default_value = "continuous")]
  pub mode: Mode,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  #[arg(long, value_name = "TIMES", default_value = "1000")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后处理配置: {}", args.config);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let classes = match &args.labels {
    Some(path) => ClassTable::from_path(path)?,
    None => ClassTable::coco(),
  };

  let config = PostprocessConfigBuilder::from_url(&args.config)?
    .classes(classes.clone())
    .build()?;
  let postprocessor = Postprocessor::new(config);

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?.with_class_table(classes);

  match args.mode {
    Mode::Oneshot => OneShotTask.run_task(input, postprocessor, output)?,
    Mode::Repeat => RepeatShotTask::default()
      .with_times(args.repeat)
      .run_task(input, postprocessor, output)?,
    Mode::Continuous => ContinuousTask::default()
      .with_frame_number(args.frame_number)
      .run_task(input, postprocessor, output)?,
  }

  Ok(())
}
