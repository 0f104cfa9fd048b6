//! Drawing surface abstraction.
//!
//! The world thread never touches the window. It draws into a
//! [`FrameRecorder`], which records [`DrawCommand`]s and publishes each
//! finished [`Frame`] over a watch channel; the window thread replays the
//! latest frame with `rendering::MacroquadCanvas`.

use crate::images::ImageHandle;
use macroquad::color::Color;
use macroquad::math::Rect;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// How an image is placed at its destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImagePlacement {
    /// Natural size.
    Natural,
    Scaled { width: f32, height: f32 },
    /// Draws the `source` sub-rectangle of the image, scaled to the given size.
    Clipped { source: Rect, width: f32, height: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    pub color: Color,
    /// Outline color and thickness.
    pub stroke: Option<(Color, f32)>,
}

impl TextStyle {
    pub fn new(font_size: f32, color: Color) -> Self {
        Self {
            font_size,
            color,
            stroke: None,
        }
    }

    pub fn with_stroke(mut self, color: Color, thickness: f32) -> Self {
        self.stroke = Some((color, thickness));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    pub width: f32,
    pub height: f32,
}

pub trait Graphics {
    fn size(&self) -> CanvasSize;

    fn clear_canvas(&mut self);

    fn draw_image(&mut self, image: &ImageHandle, x: f32, y: f32, placement: ImagePlacement);

    /// Draws `text` with its baseline starting at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: f32, y: f32, style: &TextStyle);

    fn measure_text(&self, text: &str, font_size: f32) -> TextMetrics;
}

/// A surface whose drawing is shown in batches.
pub trait FrameSink: Graphics {
    /// Publishes everything drawn since the last call. Returns false once
    /// nobody is watching any more.
    fn present(&mut self) -> bool;

    fn is_open(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Image {
        image: ImageHandle,
        x: f32,
        y: f32,
        placement: ImagePlacement,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        style: TextStyle,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub number: u64,
    pub commands: Vec<DrawCommand>,
}

/// Records draw calls and publishes them as whole frames.
pub struct FrameRecorder {
    size: CanvasSize,
    commands: Vec<DrawCommand>,
    frames: watch::Sender<Arc<Frame>>,
    number: u64,
}

impl FrameRecorder {
    pub fn new(size: CanvasSize) -> (Self, watch::Receiver<Arc<Frame>>) {
        let (frames, receiver) = watch::channel(Arc::new(Frame::default()));
        let recorder = Self {
            size,
            commands: Vec::new(),
            frames,
            number: 0,
        };
        (recorder, receiver)
    }

    /// Commands drawn since the last present.
    pub fn pending(&self) -> &[DrawCommand] {
        &self.commands
    }
}

impl Graphics for FrameRecorder {
    fn size(&self) -> CanvasSize {
        self.size
    }

    fn clear_canvas(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
    }

    fn draw_image(&mut self, image: &ImageHandle, x: f32, y: f32, placement: ImagePlacement) {
        self.commands.push(DrawCommand::Image {
            image: image.clone(),
            x,
            y,
            placement,
        });
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, style: &TextStyle) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            style: *style,
        });
    }

    // Glyph metrics only exist on the window thread; this approximates the
    // default font, which is roughly half as wide as it is tall.
    fn measure_text(&self, text: &str, font_size: f32) -> TextMetrics {
        TextMetrics {
            width: text.chars().count() as f32 * font_size * 0.5,
            height: font_size,
        }
    }
}

impl FrameSink for FrameRecorder {
    fn present(&mut self) -> bool {
        self.number += 1;
        let frame = Frame {
            number: self.number,
            commands: std::mem::take(&mut self.commands),
        };
        self.frames.send(Arc::new(frame)).is_ok()
    }

    fn is_open(&self) -> bool {
        !self.frames.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use macroquad::color::WHITE;

    fn recorder() -> (FrameRecorder, watch::Receiver<Arc<Frame>>) {
        FrameRecorder::new(CanvasSize {
            width: 800,
            height: 600,
        })
    }

    #[test]
    fn test_present_publishes_recorded_commands() {
        let (mut recorder, frames) = recorder();
        recorder.clear_canvas();
        recorder.draw_text("hello", 10.0, 20.0, &TextStyle::new(12.0, WHITE));
        assert!(recorder.present());

        let frame = frames.borrow().clone();
        assert_eq!(frame.number, 1);
        assert_eq!(frame.commands.len(), 2);
        assert_eq!(frame.commands[0], DrawCommand::Clear);
        assert!(recorder.pending().is_empty());
    }

    #[test]
    fn test_clear_discards_unpresented_commands() {
        let (mut recorder, _frames) = recorder();
        recorder.draw_text("stale", 0.0, 0.0, &TextStyle::new(12.0, WHITE));
        recorder.clear_canvas();
        assert_eq!(recorder.pending(), &[DrawCommand::Clear]);
    }

    #[test]
    fn test_closed_when_window_side_drops() {
        let (mut recorder, frames) = recorder();
        assert!(recorder.is_open());
        drop(frames);
        assert!(!recorder.is_open());
        assert!(!recorder.present());
    }

    #[test]
    fn test_measure_text_scales_with_font() {
        let (recorder, _frames) = recorder();
        let small = recorder.measure_text("abcd", 10.0);
        let large = recorder.measure_text("abcd", 20.0);
        assert_eq!(small.width * 2.0, large.width);
        assert_eq!(large.height, 20.0);
    }
}
