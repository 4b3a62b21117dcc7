// 该文件是 Guoyuan （果园） 项目的一部分。
// src/model/yolov7.rs - 模型定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  frame::{LetterboxFrame, NchwTensor},
  model::{DetectItem, DetectResult, Model, WithLabel},
};

pub const YOLOV7_INPUT_W: u32 = 640;
pub const YOLOV7_INPUT_H: u32 = 640;

const YOLOV7_INPUT_NAME: &str = "images";
const YOLOV7_OUTPUT_NAME: &str = "output";

/// 输出张量的解码契约。
///
/// 行步长与字段偏移是与具体模型的固定约定，输出本身并不自描述；
/// 换用输出布局不同的模型时，替换这里的配置即可，无需改动解码代码。
/// 不满足该契约的模型不会报错，只会解出无意义的框。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
  /// 每条检测记录占用的数值个数
  pub stride: usize,
  pub x_min: usize,
  pub y_min: usize,
  pub x_max: usize,
  pub y_max: usize,
  pub class_id: usize,
  pub score: usize,
}

impl OutputLayout {
  pub fn with_stride(self, stride: usize) -> Self {
    Self { stride, ..self }
  }
}

/// YOLOv7 端到端导出模型的输出布局：
/// 每行 7 个数值，偏移 1-4 为框角坐标，5 为类别索引，6 为置信度
pub const YOLOV7_OUTPUT_LAYOUT: OutputLayout = OutputLayout {
  stride: 7,
  x_min: 1,
  y_min: 2,
  x_max: 3,
  y_max: 4,
  class_id: 5,
  score: 6,
};

#[derive(Error, Debug)]
pub enum Yolov7Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<std::io::Error> for Yolov7Error {
  fn from(err: std::io::Error) -> Self {
    Yolov7Error::ModelLoadError(err)
  }
}

impl From<ort::Error> for Yolov7Error {
  fn from(err: ort::Error) -> Self {
    Yolov7Error::OrtError(err)
  }
}

impl Yolov7Error {
  pub fn invalid(msg: &str) -> Self {
    Yolov7Error::ModelInvalid(msg.to_string())
  }
}

pub struct Yolov7<T> {
  session: Session,
  layout: OutputLayout,
  _phantom: std::marker::PhantomData<T>,
}

pub struct Yolov7Builder {
  model_path: String,
  layout: OutputLayout,
}

const YOLOV7_SCHEME: &str = "yolov7";

impl FromUrl for Yolov7Builder {
  type Error = Yolov7Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != YOLOV7_SCHEME {
      return Err(Yolov7Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        YOLOV7_SCHEME
      )));
    }

    Ok(Yolov7Builder {
      model_path: url.path().to_string(),
      layout: YOLOV7_OUTPUT_LAYOUT,
    })
  }
}

impl Yolov7Builder {
  pub fn new(model_path: &str) -> Self {
    Yolov7Builder {
      model_path: model_path.to_string(),
      layout: YOLOV7_OUTPUT_LAYOUT,
    }
  }

  /// 换用输出布局不同的模型时替换解码契约
  pub fn layout(mut self, layout: OutputLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn build<T: WithLabel>(self) -> Result<Yolov7<T>, Yolov7Error> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    Yolov7::with_layout(&model_data, self.layout)
  }
}

impl<T: WithLabel> Yolov7<T> {
  /// 从模型文件原始字节构建推理会话。
  ///
  /// 除推理引擎自身的校验外不做结构检查；构建成功后立即用全零输入
  /// 预热一次，把加载期错误提前暴露，而不是等到第一次真实推理。
  pub fn from_bytes(model_data: &[u8]) -> Result<Self, Yolov7Error> {
    Self::with_layout(model_data, YOLOV7_OUTPUT_LAYOUT)
  }

  pub fn with_layout(model_data: &[u8], layout: OutputLayout) -> Result<Self, Yolov7Error> {
    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_memory(model_data)?;
    info!("模型加载完成");

    let mut model = Yolov7 {
      session,
      layout,
      _phantom: std::marker::PhantomData,
    };
    model.warmup()?;

    Ok(model)
  }

  fn warmup(&mut self) -> Result<(), Yolov7Error> {
    debug!("模型预热: 全零输入 [1, 3, {}, {}]", YOLOV7_INPUT_H, YOLOV7_INPUT_W);
    let zero = NchwTensor::<YOLOV7_INPUT_W, YOLOV7_INPUT_H>::default();
    let _ = self.run_raw(zero)?;
    info!("模型预热完成");
    Ok(())
  }

  /// 执行一次推理，返回输出形状与展平数据
  fn run_raw(
    &mut self,
    tensor: NchwTensor<YOLOV7_INPUT_W, YOLOV7_INPUT_H>,
  ) -> Result<(Vec<usize>, Vec<f32>), Yolov7Error> {
    let shape = [1usize, tensor.channels(), tensor.height(), tensor.width()];
    let input = Tensor::from_array((shape, tensor.into_inner()))?;

    debug!("执行模型推理");
    let outputs = self.session.run(ort::inputs![YOLOV7_INPUT_NAME => input])?;

    let output = outputs
      .get(YOLOV7_OUTPUT_NAME)
      .ok_or_else(|| Yolov7Error::invalid(&format!("缺少输出张量 {}", YOLOV7_OUTPUT_NAME)))?;
    let (shape, data) = output.try_extract_tensor::<f32>()?;

    let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    debug!("模型输出形状: {:?}", shape);

    Ok((shape, data.to_vec()))
  }
}

/// 按固定步长解码输出张量。
///
/// 每 `stride` 个数值为一条记录，不做置信度过滤，也不做非极大值抑制，
/// 解出的每条记录都会交给渲染端。坐标仍处于模型方形空间。
pub fn decode<T: WithLabel>(data: &[f32], layout: &OutputLayout) -> DetectResult<T> {
  let mut items = Vec::new();

  if layout.stride == 0 {
    return DetectResult {
      items: items.into_boxed_slice(),
    };
  }

  let mut r = 0;
  while r + layout.stride <= data.len() {
    let record = &data[r..r + layout.stride];
    // 偏移超出记录时取 NaN, 契约不匹配解出无意义的框而不是崩溃
    let field = |offset: usize| record.get(offset).copied().unwrap_or(f32::NAN);

    let x_min = field(layout.x_min);
    let y_min = field(layout.y_min);
    let x_max = field(layout.x_max);
    let y_max = field(layout.y_max);
    let class_id = field(layout.class_id) as u32;
    let score = field(layout.score);

    items.push(DetectItem {
      kind: T::from_label_id(class_id),
      score,
      bbox: [x_min, y_min, x_max, y_max],
    });

    r += layout.stride;
  }

  debug!("解码出 {} 条检测记录", items.len());

  DetectResult {
    items: items.into_boxed_slice(),
  }
}

impl<T: WithLabel> Model for Yolov7<T> {
  type Input = LetterboxFrame<YOLOV7_INPUT_W, YOLOV7_INPUT_H>;
  type Output = DetectResult<T>;
  type Error = Yolov7Error;

  fn infer(&mut self, input: Self::Input) -> Result<Self::Output, Self::Error> {
    let (shape, data) = self.run_raw(input.tensor)?;

    // 行步长以输出形状第二维为准，形状缺失时退回声明的契约值
    let stride = shape
      .get(1)
      .copied()
      .filter(|&s| s > 0)
      .unwrap_or(self.layout.stride);
    if stride != self.layout.stride {
      debug!("输出行步长 {} 与声明契约 {} 不一致", stride, self.layout.stride);
    }

    Ok(decode(&data, &self.layout.with_stride(stride)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::FruitLabel;

  #[test]
  fn decode_yields_one_record_per_stride() {
    let data = vec![0f32; 7 * 4];
    let result: DetectResult<FruitLabel> = decode(&data, &YOLOV7_OUTPUT_LAYOUT);
    assert_eq!(result.len(), 4);
  }

  #[test]
  fn decode_reads_fixed_offsets() {
    let data = [0.0, 100.0, 100.0, 200.0, 200.0, 2.0, 0.9];
    let result: DetectResult<FruitLabel> = decode(&data, &YOLOV7_OUTPUT_LAYOUT);

    assert_eq!(result.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.bbox, [100.0, 100.0, 200.0, 200.0]);
    assert_eq!(item.kind, FruitLabel::Mango);
    assert_eq!(item.score, 0.9);
  }

  #[test]
  fn decode_class_ids_stay_in_table_range() {
    let mut data = Vec::new();
    for id in 0..11 {
      data.extend_from_slice(&[0.0, 0.0, 0.0, 1.0, 1.0, id as f32, 0.5]);
    }
    let result: DetectResult<FruitLabel> = decode(&data, &YOLOV7_OUTPUT_LAYOUT);
    assert_eq!(result.len(), 11);
    for item in result.items.iter() {
      assert!(item.kind.to_label_id() < FruitLabel::COUNT);
    }
  }

  #[test]
  fn decode_drops_trailing_partial_record() {
    let data = vec![0f32; 7 * 2 + 3];
    let result: DetectResult<FruitLabel> = decode(&data, &YOLOV7_OUTPUT_LAYOUT);
    assert_eq!(result.len(), 2);
  }

  #[test]
  fn decode_honors_substituted_layout() {
    // 步长为 9 的假想模型, 字段偏移不变
    let layout = YOLOV7_OUTPUT_LAYOUT.with_stride(9);
    let mut data = vec![0f32; 9];
    data[1] = 10.0;
    data[3] = 30.0;
    let result: DetectResult<FruitLabel> = decode(&data, &layout);
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].bbox, [10.0, 0.0, 30.0, 0.0]);
  }

  #[test]
  fn zero_stride_decodes_nothing() {
    let layout = YOLOV7_OUTPUT_LAYOUT.with_stride(0);
    let result: DetectResult<FruitLabel> = decode(&[1.0, 2.0], &layout);
    assert!(result.is_empty());
  }
}
