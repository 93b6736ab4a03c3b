// 画布模块 - 像素画布及快照的导出与恢复
//
// 快照是整张画布的PNG序列化，身份按分配区分，不按内容

use anyhow::{anyhow, Context, Result};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, Rgba, RgbaImage};
use std::fmt;
use std::sync::Arc;

use crate::models::{CanvasSettings, Point, StrokeStyle};

/// 画布快照（不可变）
#[derive(Clone)]
pub struct Snapshot {
    png: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl Snapshot {
    pub fn new(png: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            png: Arc::from(png),
            width,
            height,
        }
    }

    /// PNG编码后的字节
    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

// 两个像素完全相同的快照仍是不同实体
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.png, &other.png)
    }
}

impl Eq for Snapshot {}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.png.len())
            .finish()
    }
}

/// 光栅画布接口
///
/// 恢复分两步：`decode_snapshot` 在阻塞线程池中解码，
/// 解码完成后再由持有者调用 `apply_frame` 绘制
pub trait RasterSurface: Send + 'static {
    /// 解码后的像素帧
    type Frame: Send + 'static;

    /// 绘制一段线段
    fn paint_segment(&mut self, from: Point, to: Point, style: StrokeStyle);

    /// 清空画布
    fn clear(&mut self);

    /// 背景色，橡皮擦以此颜色绘制
    fn background(&self) -> [u8; 4];

    /// 导出当前画布
    fn export_snapshot(&self) -> Result<Snapshot>;

    /// 解码快照（阻塞操作）
    fn decode_snapshot(snapshot: &Snapshot) -> Result<Self::Frame>;

    /// 用解码后的帧替换当前像素
    fn apply_frame(&mut self, frame: Self::Frame) -> Result<()>;
}

/// 内存RGBA画布
pub struct PixelCanvas {
    pixels: RgbaImage,
    background: Rgba<u8>,
}

impl PixelCanvas {
    pub fn new(settings: &CanvasSettings) -> Result<Self> {
        if settings.width == 0 || settings.height == 0 {
            return Err(anyhow!(
                "画布尺寸无效: {}x{}",
                settings.width,
                settings.height
            ));
        }
        let background = Rgba(settings.background);
        Ok(Self {
            pixels: RgbaImage::from_pixel(settings.width, settings.height, background),
            background,
        })
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    fn blend_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let [r, g, b, a] = color;
        if a == 0 {
            return;
        }
        if a == 255 {
            self.pixels.put_pixel(x, y, Rgba(color));
            return;
        }
        let dst = self.pixels.get_pixel(x, y).0;
        let src_a = a as f32 / 255.0;
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        if out_a <= 0.0 {
            return;
        }
        let blend = |src: u8, dst: u8| {
            let src_f = src as f32 / 255.0;
            let dst_f = dst as f32 / 255.0;
            ((src_f * src_a + dst_f * dst_a * (1.0 - src_a)) / out_a * 255.0)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        self.pixels.put_pixel(
            x,
            y,
            Rgba([
                blend(r, dst[0]),
                blend(g, dst[1]),
                blend(b, dst[2]),
                (out_a * 255.0) as u8,
            ]),
        );
    }

    /// 把线段裁剪到画布（四周外扩笔触半径）范围内，完全在外或含非有限坐标时返回 None
    fn clip_segment(&self, from: Point, to: Point, radius: f32) -> Option<(Point, Point)> {
        if ![from.x, from.y, to.x, to.y].iter().all(|v| v.is_finite()) {
            return None;
        }
        let min_x = -radius;
        let min_y = -radius;
        let max_x = self.pixels.width() as f32 + radius;
        let max_y = self.pixels.height() as f32 + radius;

        // Liang-Barsky
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;
        for (p, q) in [
            (-dx, from.x - min_x),
            (dx, max_x - from.x),
            (-dy, from.y - min_y),
            (dy, max_y - from.y),
        ] {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
            } else {
                let t = q / p;
                if p < 0.0 {
                    t0 = t0.max(t);
                } else {
                    t1 = t1.min(t);
                }
            }
        }
        if t0 > t1 {
            return None;
        }
        Some((
            Point::new(from.x + dx * t0, from.y + dy * t0),
            Point::new(from.x + dx * t1, from.y + dy * t1),
        ))
    }

    fn stamp_disc(&mut self, center: Point, radius: f32, color: [u8; 4]) {
        let radius_sq = radius * radius;
        let width = self.pixels.width() as i64;
        let height = self.pixels.height() as i64;
        let min_x = ((center.x - radius).floor() as i64).max(0);
        let max_x = ((center.x + radius).ceil() as i64).min(width - 1);
        let min_y = ((center.y - radius).floor() as i64).max(0);
        let max_y = ((center.y + radius).ceil() as i64).min(height - 1);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                if dx * dx + dy * dy <= radius_sq {
                    self.blend_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

impl RasterSurface for PixelCanvas {
    type Frame = RgbaImage;

    fn paint_segment(&mut self, from: Point, to: Point, style: StrokeStyle) {
        let radius = (style.width / 2.0).max(0.5);
        let Some((from, to)) = self.clip_segment(from, to, radius) else {
            return;
        };
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i32;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let point = Point::new(from.x + dx * t, from.y + dy * t);
            self.stamp_disc(point, radius, style.color);
        }
    }

    fn clear(&mut self) {
        let background = self.background;
        for pixel in self.pixels.pixels_mut() {
            *pixel = background;
        }
    }

    fn background(&self) -> [u8; 4] {
        self.background.0
    }

    fn export_snapshot(&self) -> Result<Snapshot> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(
                self.pixels.as_raw(),
                self.pixels.width(),
                self.pixels.height(),
                ColorType::Rgba8,
            )
            .context("画布PNG编码失败")?;
        Ok(Snapshot::new(png, self.pixels.width(), self.pixels.height()))
    }

    fn decode_snapshot(snapshot: &Snapshot) -> Result<RgbaImage> {
        let decoded = image::load_from_memory_with_format(snapshot.png_bytes(), ImageFormat::Png)
            .context("快照解码失败")?;
        Ok(decoded.to_rgba8())
    }

    fn apply_frame(&mut self, frame: RgbaImage) -> Result<()> {
        if frame.dimensions() != self.pixels.dimensions() {
            return Err(anyhow!(
                "快照尺寸 {:?} 与画布尺寸 {:?} 不一致",
                frame.dimensions(),
                self.pixels.dimensions()
            ));
        }
        self.pixels = frame;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolKind;

    /// 与背景色不同的像素数
    fn ink_coverage(canvas: &PixelCanvas) -> usize {
        canvas
            .pixels()
            .pixels()
            .filter(|pixel| **pixel != canvas.background)
            .count()
    }

    fn small_canvas() -> PixelCanvas {
        PixelCanvas::new(&CanvasSettings {
            width: 32,
            height: 24,
            background: [255, 255, 255, 255],
        })
        .unwrap()
    }

    #[test]
    fn test_zero_sized_canvas_rejected() {
        let settings = CanvasSettings {
            width: 0,
            height: 10,
            background: [255, 255, 255, 255],
        };
        assert!(PixelCanvas::new(&settings).is_err());
    }

    #[test]
    fn test_paint_segment_leaves_ink() {
        let mut canvas = small_canvas();
        assert_eq!(ink_coverage(&canvas), 0);

        let style = ToolKind::Pencil.style(canvas.background());
        canvas.paint_segment(Point::new(2.0, 2.0), Point::new(20.0, 15.0), style);
        assert!(ink_coverage(&canvas) > 0, "线段应该留下墨迹");
        assert_eq!(canvas.pixels().get_pixel(2, 2).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_segment_outside_canvas_is_clipped() {
        let mut canvas = small_canvas();
        let style = ToolKind::Pencil.style(canvas.background());
        canvas.paint_segment(Point::new(-50.0, -50.0), Point::new(-40.0, -45.0), style);
        canvas.paint_segment(Point::new(30.0, 22.0), Point::new(90.0, 90.0), style);
        assert!(ink_coverage(&canvas) > 0);
    }

    #[test]
    fn test_far_off_canvas_segment_is_clipped() {
        let mut canvas = small_canvas();
        let style = ToolKind::Pencil.style(canvas.background());

        let started = std::time::Instant::now();
        canvas.paint_segment(Point::new(10.0, 10.0), Point::new(1.0e9, 10.0), style);
        canvas.paint_segment(Point::new(5.0, 5.0), Point::new(f32::MAX, f32::MAX), style);
        assert!(
            started.elapsed() < std::time::Duration::from_secs(1),
            "超出画布的线段应被裁剪"
        );

        let mut fresh = small_canvas();
        fresh.paint_segment(Point::new(10.0, 10.0), Point::new(1.0e9, 10.0), style);
        for (x, y, pixel) in fresh.pixels().enumerate_pixels() {
            if pixel.0 != [255, 255, 255, 255] {
                assert!((9..=10).contains(&y), "墨迹只应落在第10行附近: ({}, {})", x, y);
            }
        }
        assert_eq!(fresh.pixels().get_pixel(31, 10).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_non_finite_segment_is_skipped() {
        let mut canvas = small_canvas();
        let style = ToolKind::Pencil.style(canvas.background());
        canvas.paint_segment(Point::new(f32::NAN, 3.0), Point::new(10.0, 10.0), style);
        canvas.paint_segment(Point::new(1.0, 1.0), Point::new(f32::INFINITY, 10.0), style);
        assert_eq!(ink_coverage(&canvas), 0);
    }

    #[test]
    fn test_segment_entirely_outside_is_skipped() {
        let mut canvas = small_canvas();
        let style = ToolKind::Pencil.style(canvas.background());
        canvas.paint_segment(Point::new(-1.0e9, -50.0), Point::new(1.0e9, -50.0), style);
        assert_eq!(ink_coverage(&canvas), 0);
    }

    #[test]
    fn test_eraser_restores_background() {
        let mut canvas = small_canvas();
        let pencil = ToolKind::Pencil.style(canvas.background());
        let eraser = ToolKind::Eraser.style(canvas.background());
        canvas.paint_segment(Point::new(5.0, 10.0), Point::new(25.0, 10.0), pencil);
        canvas.paint_segment(Point::new(0.0, 10.0), Point::new(31.0, 10.0), eraser);
        assert_eq!(ink_coverage(&canvas), 0);
    }

    #[test]
    fn test_snapshot_restores_pixels() {
        let mut canvas = small_canvas();
        let style = ToolKind::Pencil.style(canvas.background());
        canvas.paint_segment(Point::new(1.0, 1.0), Point::new(30.0, 20.0), style);
        let painted = canvas.pixels().clone();
        let snapshot = canvas.export_snapshot().unwrap();
        assert_eq!(snapshot.dimensions(), (32, 24));

        canvas.clear();
        assert_eq!(ink_coverage(&canvas), 0);

        let frame = PixelCanvas::decode_snapshot(&snapshot).unwrap();
        canvas.apply_frame(frame).unwrap();
        assert_eq!(canvas.pixels(), &painted);
    }

    #[test]
    fn test_snapshot_identity_is_not_content() {
        let canvas = small_canvas();
        let first = canvas.export_snapshot().unwrap();
        let second = canvas.export_snapshot().unwrap();
        assert_eq!(first.png_bytes(), second.png_bytes());
        assert_ne!(first, second, "相同像素的快照应是不同实体");
        assert_eq!(first.clone(), first);
    }

    #[test]
    fn test_apply_frame_with_wrong_size_fails() {
        let mut canvas = small_canvas();
        let other = PixelCanvas::new(&CanvasSettings::default()).unwrap();
        let snapshot = other.export_snapshot().unwrap();
        let frame = PixelCanvas::decode_snapshot(&snapshot).unwrap();
        assert!(canvas.apply_frame(frame).is_err());
    }
}
