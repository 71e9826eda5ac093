// 该文件是 Wangyan （望眼） 项目的一部分。
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

use super::{OutputError, Render};
use crate::screen::ScreenView;
use crate::{FromUrl, FromUrlWithScheme};

/// 只把覆盖框写入日志，不绘制画面
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(LogOutput)
  }
}

impl Render for LogOutput {
  type Error = Infallible;

  fn render_view(&self, view: &ScreenView<'_>) -> Result<(), Self::Error> {
    if view.boxes.is_empty() {
      return Ok(());
    }

    info!(
      "[{}] {} 个对象 (接收 {} / 丢弃 {} / 推理 {})",
      view.button,
      view.boxes.len(),
      view.stats.frames_received,
      view.stats.frames_dropped,
      view.stats.frames_processed
    );
    for overlay in &view.boxes {
      info!(
        "  - {} at ({:.0}, {:.0}, {:.0}x{:.0})",
        overlay.caption,
        overlay.rect.left,
        overlay.rect.top,
        overlay.rect.width,
        overlay.rect.height
      );
    }
    Ok(())
  }
}
