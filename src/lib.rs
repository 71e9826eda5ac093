// 该文件是 Wangyan （望眼） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod camera;
pub mod frame;
pub mod geometry;
pub mod model;
pub mod notify;
pub mod output;
pub mod screen;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 取出 URL 中的文件路径（已做百分号解码）
pub fn url_path(url: &url::Url) -> PathBuf {
  let raw = url.path();
  match urlencoding::decode(raw) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(raw),
  }
}

/// 查找 URL 查询参数
pub fn query_value(url: &url::Url, key: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_decodes_spaces() {
    let url = url::Url::parse("image:///tmp/my%20frames/cat.png").unwrap();
    assert_eq!(url_path(&url), PathBuf::from("/tmp/my frames/cat.png"));
  }

  #[test]
  fn query_value_finds_first_match() {
    let url = url::Url::parse("replay:///m.json?labels=/l.txt&confidence=0.3").unwrap();
    assert_eq!(query_value(&url, "labels").as_deref(), Some("/l.txt"));
    assert_eq!(query_value(&url, "confidence").as_deref(), Some("0.3"));
    assert_eq!(query_value(&url, "missing"), None);
  }
}
