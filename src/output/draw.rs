// 该文件是 Guoyuan （果园） 项目的一部分。
// src/output/draw.rs - 检测结果绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::frame::PadRatio;
use crate::model::{DetectItem, DetectResult, WithLabel};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const BOX_LINE_WIDTH: i32 = 5;
// 框顶距画布上缘超过该值时标签画在框上方, 否则画进框内侧
const LABEL_TOP_CLEARANCE: f32 = 20.0;
const LABEL_ABOVE_OFFSET: i32 = 28;
const LABEL_BELOW_OFFSET: i32 = 2;

/// 画布显示比例：画布尺寸相对模型输入尺寸的比值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRatio {
  pub x: f32,
  pub y: f32,
}

impl DisplayRatio {
  pub fn of(canvas_w: u32, canvas_h: u32, model_w: u32, model_h: u32) -> Self {
    DisplayRatio {
      x: canvas_w as f32 / model_w as f32,
      y: canvas_h as f32 / model_h as f32,
    }
  }
}

/// 渲染画布。
///
/// 每次上传图像时重建，尺寸即图像的原始尺寸，基底为源图像本身；
/// 输出端在其副本上绘制检测框。
pub struct Canvas {
  image: RgbImage,
  ratio: PadRatio,
  display: DisplayRatio,
}

impl Canvas {
  pub fn new(image: RgbImage, ratio: PadRatio, display: DisplayRatio) -> Self {
    Canvas {
      image,
      ratio,
      display,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn ratio(&self) -> PadRatio {
    self.ratio
  }

  pub fn display(&self) -> DisplayRatio {
    self.display
  }
}

/// 把模型方形空间的框角坐标投影为画布像素 [x, y, 宽, 高]。
///
/// 两级缩放缺一不可：填充比例把方形坐标还原到原图像素，
/// 显示比例再把原图像素换算到画布分辨率。
pub fn project(bbox: &[f32; 4], ratio: PadRatio, display: DisplayRatio) -> [f32; 4] {
  let w = bbox[2] - bbox[0];
  let h = bbox[3] - bbox[1];

  [
    bbox[0] * ratio.x * display.x,
    bbox[1] * ratio.y * display.y,
    w * ratio.x * display.x,
    h * ratio.y * display.y,
  ]
}

fn label_top(box_top: f32) -> i32 {
  if box_top > LABEL_TOP_CLEARANCE {
    box_top as i32 - LABEL_ABOVE_OFFSET
  } else {
    box_top as i32 + LABEL_BELOW_OFFSET
  }
}

pub struct Draw<'a> {
  font: FontRef<'a>,
  font_scale: PxScale,
}

impl Default for Draw<'_> {
  fn default() -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontRef::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }
}

impl Draw<'_> {
  /// 在画布副本上绘制全部检测结果。
  ///
  /// 不做置信度过滤：解码得到的每条记录都会被画出。
  pub fn draw_detections_on_image<T: WithLabel>(
    &self,
    image: &mut RgbImage,
    result: &DetectResult<T>,
    ratio: PadRatio,
    display: DisplayRatio,
  ) {
    for DetectItem { kind, score: _, bbox } in result.items.iter() {
      let [x, y, w, h] = project(bbox, ratio, display);
      let color = Rgb(kind.color());

      self.draw_box(image, x, y, w, h, color);
      self.draw_label(image, &kind.to_label_str(), x, y, color);
    }
  }

  // 5 像素线宽的空心矩形, 逐像素向内收缩, 超出画布的部分裁掉
  fn draw_box(&self, image: &mut RgbImage, x: f32, y: f32, w: f32, h: f32, color: Rgb<u8>) {
    let left = x.max(0.0) as i32;
    let top = y.max(0.0) as i32;
    let width = w.min(image.width() as f32 - left as f32) as u32;
    let height = h.min(image.height() as f32 - top as f32) as u32;

    if width == 0 || height == 0 {
      return;
    }

    for t in 0..BOX_LINE_WIDTH {
      let inner_w = width.saturating_sub(2 * t as u32);
      let inner_h = height.saturating_sub(2 * t as u32);
      if inner_w == 0 || inner_h == 0 {
        break;
      }
      let rect = Rect::at(left + t, top + t).of_size(inner_w, inner_h);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  fn draw_label(&self, image: &mut RgbImage, label: &str, x: f32, y: f32, color: Rgb<u8>) {
    let text_x = x.max(0.0) as i32;
    let text_y = label_top(y).max(0);

    draw_text_mut(
      image,
      color,
      text_x,
      text_y,
      self.font_scale,
      &self.font,
      label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::FruitLabel;

  fn single_result(bbox: [f32; 4], id: u32) -> DetectResult<FruitLabel> {
    DetectResult {
      items: vec![DetectItem {
        kind: FruitLabel::from_label_id(id),
        score: 0.9,
        bbox,
      }]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn square_corners_map_to_canvas_corners() {
    // 方形图像: 填充比例 1, 画布 800x800, 显示比例 1.25
    let ratio = PadRatio { x: 1.0, y: 1.0 };
    let display = DisplayRatio::of(800, 800, 640, 640);
    let projected = project(&[0.0, 0.0, 640.0, 640.0], ratio, display);
    assert_eq!(projected, [0.0, 0.0, 800.0, 800.0]);
  }

  #[test]
  fn both_corrections_are_applied() {
    // 规格场景: 填充比例 1.5, 画布与原图同分辨率(显示比例 1)
    let ratio = PadRatio { x: 1.5, y: 1.5 };
    let display = DisplayRatio::of(640, 640, 640, 640);
    let projected = project(&[100.0, 100.0, 200.0, 200.0], ratio, display);
    assert_eq!(projected, [150.0, 150.0, 150.0, 150.0]);
  }

  #[test]
  fn label_sits_above_unless_near_top() {
    assert!(label_top(150.0) < 150);
    assert!(label_top(10.0) > 10);
  }

  #[test]
  fn detection_border_uses_class_color() {
    let mut image = RgbImage::new(640, 640);
    let result = single_result([100.0, 100.0, 200.0, 200.0], 2);
    let draw = Draw::default();

    draw.draw_detections_on_image(
      &mut image,
      &result,
      PadRatio { x: 1.5, y: 1.5 },
      DisplayRatio::of(640, 640, 640, 640),
    );

    // 投影后的框: (150, 150) 起, 150x150, 上边框应为芒果橙
    assert_eq!(*image.get_pixel(200, 150), Rgb([255, 152, 0]));
  }

  #[test]
  fn empty_result_leaves_canvas_untouched() {
    let mut image = RgbImage::new(16, 16);
    let draw = Draw::default();
    draw.draw_detections_on_image::<FruitLabel>(
      &mut image,
      &DetectResult {
        items: Vec::new().into_boxed_slice(),
      },
      PadRatio { x: 1.0, y: 1.0 },
      DisplayRatio::of(16, 16, 640, 640),
    );
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }
}
