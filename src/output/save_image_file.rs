// 该文件是 Wangyan （望眼） 项目的一部分。
// src/output/save_image_file.rs - 保存画面到图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::output::Render;
use crate::output::draw::{Draw, DrawError};
use crate::screen::ScreenView;
use crate::{FromUrl, FromUrlWithScheme};

/// 每次渲染覆盖同一个文件
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("缺少输出文件路径")]
  EmptyPath,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = crate::url_path(uri);
    if path.as_os_str().is_empty() || path == Path::new("/") {
      return Err(SaveImageFileError::EmptyPath);
    }

    Ok(SaveImageFileOutput {
      path,
      draw: Draw::from_url_query(uri)?,
    })
  }
}

impl SaveImageFileOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    debug!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_view(&self, view: &ScreenView<'_>) -> Result<(), Self::Error> {
    if view.size.is_empty() {
      return Ok(());
    }
    let image = self.draw.draw_view(view);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Size;
  use crate::screen::{START_CAPTION, ScreenStats};

  fn empty_view(size: Size) -> ScreenView<'static> {
    ScreenView {
      size,
      preview: None,
      detections: None,
      boxes: Vec::new(),
      button: START_CAPTION,
      notifications: Vec::new(),
      stats: ScreenStats::default(),
    }
  }

  #[test]
  fn renders_overwrite_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("screen.png");
    let url = Url::parse(&format!("image://{}", target.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), target.as_path());

    output.render_view(&empty_view(Size::new(40, 60))).unwrap();
    output.render_view(&empty_view(Size::new(30, 20))).unwrap();

    let saved = image::open(&target).unwrap();
    assert_eq!((saved.width(), saved.height()), (30, 20));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
