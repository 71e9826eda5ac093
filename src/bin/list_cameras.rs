// 该文件是 Wangyan （望眼） 项目的一部分。
// src/bin/list_cameras.rs - 列出可用摄像头
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use wangyan::{
  FromUrl,
  camera::{CameraProvider, CameraSource, select_camera},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 摄像头来源，例如 v4l:// 枚举全部设备
  #[arg(long, value_name = "CAMERA")]
  pub camera: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let provider = CameraSource::from_url(&args.camera)?;
  let cameras = provider.available_cameras()?;

  if cameras.is_empty() {
    println!("没有可用的摄像头");
    return Ok(());
  }

  let selected = select_camera(&cameras)?;
  for camera in &cameras {
    let mark = if camera == selected { "*" } else { " " };
    println!(
      "{} {} ({:?}, 传感器方向 {}°) {}",
      mark,
      camera.name,
      camera.lens_direction,
      camera.sensor_orientation.degrees(),
      camera.uri
    );
  }
  Ok(())
}
