// 该文件是 Wangyan （望眼） 项目的一部分。
// src/bin/live_detect.rs - 实时检测界面
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

use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use wangyan::{
  FromUrl,
  camera::{CameraSource, ResolutionPreset},
  geometry::Size,
  model::{BackendLoader, ModelConfig},
  output::OutputWrapper,
  screen::{DetectionScreen, ScreenConfig},
  task::{LiveTask, spawn_console},
};

/// 望眼实时检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头来源，例如 image:///tmp/still.png?fps=15 或 v4l:///dev/video0
  #[arg(long, value_name = "CAMERA")]
  pub camera: Url,
  /// 模型，例如 replay:///tmp/script.json?labels=/tmp/coco.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 画面输出，例如 image:///tmp/screen.png、folder:///tmp/frames?always 或 log://
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 屏幕尺寸（竖屏）
  #[arg(long, value_name = "WxH", default_value = "480x640")]
  pub screen: Size,
  /// 采集分辨率: low / medium / high
  #[arg(long, value_name = "PRESET", default_value = "medium")]
  pub preset: ResolutionPreset,
  /// 推理指定帧数后退出，0 表示不限
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
  /// 启动后不自动开始检测，需按回车切换
  #[arg(long)]
  pub no_auto_start: bool,
  /// 通知显示时长（秒）
  #[arg(long, value_name = "SECONDS", default_value_t = 4)]
  pub notification_secs: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("摄像头来源: {}", args.camera);
  info!("模型: {}", args.model);
  info!("画面输出: {}", args.output);

  let provider = CameraSource::from_url(&args.camera)?;
  let model_config = ModelConfig::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let config = ScreenConfig {
    preset: args.preset,
    notification_duration: Duration::from_secs(args.notification_secs),
    auto_start: !args.no_auto_start,
  };

  let (tx, rx) = mpsc::channel();
  let screen = DetectionScreen::new(provider, BackendLoader, model_config, config, tx.clone());

  spawn_console(tx.clone())?;
  info!("输入回车切换检测，pause / resume 模拟前后台切换，quit 退出");

  LiveTask::default()
    .with_frame_number(Some(args.frame_number))
    .run_task(screen, rx, tx, output, args.screen)
}
