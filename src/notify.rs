// 该文件是 Wangyan （望眼） 项目的一部分。
// src/notify.rs - 临时界面通知
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

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

const MAX_NOTIFICATIONS: usize = 8;
const DEFAULT_DURATION: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub message: String,
  pub level: NotificationLevel,
  pub expires_at: Instant,
}

/// 到期自动消失的通知队列
#[derive(Debug)]
pub struct Notifications {
  duration: Duration,
  queue: VecDeque<Notification>,
}

impl Default for Notifications {
  fn default() -> Self {
    Self::with_duration(DEFAULT_DURATION)
  }
}

impl Notifications {
  pub fn with_duration(duration: Duration) -> Self {
    Self {
      duration,
      queue: VecDeque::with_capacity(MAX_NOTIFICATIONS),
    }
  }

  pub fn push(&mut self, level: NotificationLevel, message: impl Into<String>, now: Instant) {
    let message = message.into();
    match level {
      NotificationLevel::Info => info!("通知: {}", message),
      NotificationLevel::Warning => warn!("通知: {}", message),
      NotificationLevel::Error => error!("通知: {}", message),
    }

    if self.queue.len() == MAX_NOTIFICATIONS {
      self.queue.pop_front();
    }
    self.queue.push_back(Notification {
      message,
      level,
      expires_at: now + self.duration,
    });
  }

  /// 尚未到期的通知，最早的在前
  pub fn active(&self, now: Instant) -> impl Iterator<Item = &Notification> {
    self.queue.iter().filter(move |n| n.expires_at > now)
  }

  pub fn prune(&mut self, now: Instant) {
    self.queue.retain(|n| n.expires_at > now);
  }

  pub fn len(&self) -> usize {
    self.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }
}
