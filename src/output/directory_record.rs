// 该文件是 Guoyuan （果园） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, WithLabel},
  output::{
    Render,
    draw::{Canvas, Draw},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把检测结果写成文本记录, 每条记录一行 JSON
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn record<T: WithLabel>(
    &self,
    result: &DetectResult<T>,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    let mut records = Vec::new();
    for item in result.items.iter() {
      let label = if self.label_with_name {
        serde_json::Value::from(item.kind.to_label_str())
      } else {
        serde_json::Value::from(item.kind.to_label_id())
      };
      let record = serde_json::json!({
        "label": label,
        "score": item.score,
        "bbox": item.bbox,
      });
      records.push(record.to_string());
    }
    std::fs::write(path.with_extension("json"), records.join("\n"))?;
    Ok(())
  }
}

pub enum DrawWrapper<'a> {
  Draw(Box<Draw<'a>>),
  Record(Record),
}

impl DrawWrapper<'_> {
  pub fn save_result<T: WithLabel>(
    &self,
    path: &PathBuf,
    frame: &Canvas,
    result: &DetectResult<T>,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        let mut image = frame.image().clone();
        draw.draw_detections_on_image(&mut image, result, frame.ratio(), frame.display());
        image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.image().save(path)?;
        record.record(result, path)?;
      }
    };

    Ok(())
  }

  pub fn with(kind: &str) -> Self {
    match kind {
      "record-name" => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      "record-id" => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      _ => DrawWrapper::Draw(Box::new(Draw::default())),
    }
  }
}

pub struct DirectoryRecordOutput<'a> {
  directory: PathBuf,
  draw: DrawWrapper<'a>,
  frame_counters: Arc<Mutex<u16>>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput<'_> {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput<'_> {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = {
      let mut kind = "draw";
      for (k, v) in uri.query_pairs() {
        if k == "record" {
          if v == "id" {
            kind = "record-id";
          } else {
            kind = "record-name";
          }
          break;
        }
      }
      kind
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: DrawWrapper::with(kind),
      frame_counters: Arc::new(Mutex::new(0)),
      always,
    })
  }
}

impl DirectoryRecordOutput<'_> {
  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counters
      .lock()
      .unwrap_or_else(|e| e.into_inner());
    let id = *counter + 1;
    *counter = id;
    id
  }

  fn frame_path(&self) -> Result<PathBuf, std::io::Error> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl<T: WithLabel> Render<Canvas, DetectResult<T>> for DirectoryRecordOutput<'_> {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Canvas, result: &DetectResult<T>) -> Result<(), Self::Error> {
    if self.always || !result.is_empty() {
      let path = self.frame_path()?;
      self.draw.save_result(&path, frame, result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, FruitLabel};

  fn single_result() -> DetectResult<FruitLabel> {
    DetectResult {
      items: vec![DetectItem {
        kind: FruitLabel::Pitaya,
        score: 0.75,
        bbox: [1.0, 2.0, 3.0, 4.0],
      }]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn record_writes_one_json_line_per_detection() {
    let dir = std::env::temp_dir().join(format!("guoyuan-record-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("frame.png");

    let record = Record {
      label_with_name: true,
    };
    record.record(&single_result(), &path).unwrap();

    let written = std::fs::read_to_string(path.with_extension("json")).unwrap();
    let line: serde_json::Value = serde_json::from_str(written.lines().next().unwrap()).unwrap();
    assert_eq!(line["label"], "питайя");
    assert_eq!(line["bbox"][3], 4.0);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn record_can_use_numeric_labels() {
    let dir = std::env::temp_dir().join(format!("guoyuan-record-id-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("frame.png");

    let record = Record {
      label_with_name: false,
    };
    record.record(&single_result(), &path).unwrap();

    let written = std::fs::read_to_string(path.with_extension("json")).unwrap();
    let line: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(line["label"], 4);

    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn query_pairs_select_record_kind() {
    let url = url::Url::parse("folder:///tmp/records?record=id").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(matches!(
      output.draw,
      DrawWrapper::Record(Record {
        label_with_name: false
      })
    ));
    assert!(!output.always);
  }
}
