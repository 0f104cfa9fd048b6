use crate::entity::{Entity, ScreenPosition};
use crate::graphics::{
    CanvasSize, DrawCommand, Frame, FrameSink, Graphics, ImagePlacement, TextStyle,
};
use crate::images::ImageHandle;
use crate::map::Map;
use macroquad::prelude::*;
use shared::{EntityId, TILE_SIZE};
use std::collections::HashMap;

const BACKGROUND: Color = Color::new(0.1, 0.1, 0.1, 1.0);
const LOADING_FONT_SIZE: f32 = 24.0;
const FPS_FONT_SIZE: f32 = 12.0;

/// Top-left corner of the visible part of the world, in world pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
}

impl Camera {
    pub fn to_screen(&self, x: f32, y: f32) -> ScreenPosition {
        ScreenPosition {
            x: x - self.x,
            y: y - self.y,
        }
    }
}

/// Draws the map and its entities through any [`Graphics`] surface.
#[derive(Debug, Default)]
pub struct WorldRenderer {
    camera: Camera,
}

impl WorldRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    /// Centers the camera on `target`. Along an axis where the map is larger
    /// than the canvas the camera stays inside the map; otherwise the map is
    /// centered.
    pub fn follow(&mut self, target: Option<(f32, f32)>, map: &Map, size: CanvasSize) {
        let (map_width, map_height) = map.pixel_size();
        let (view_width, view_height) = (size.width as f32, size.height as f32);
        let (target_x, target_y) = target.unwrap_or((map_width / 2.0, map_height / 2.0));

        self.camera = Camera {
            x: clamp_axis(target_x - view_width / 2.0, map_width, view_width),
            y: clamp_axis(target_y - view_height / 2.0, map_height, view_height),
        };
    }

    pub fn draw_world(
        &mut self,
        graphics: &mut dyn Graphics,
        map: &Map,
        entities: &[Entity],
        player: Option<EntityId>,
    ) {
        let size = graphics.size();
        let target = player
            .and_then(|id| entities.iter().find(|entity| entity.id() == id))
            .map(Entity::position);
        self.follow(target, map, size);

        graphics.clear_canvas();
        self.draw_terrain(graphics, map, size);

        for entity in entities {
            let (x, y) = entity.position();
            entity.draw(graphics, self.camera.to_screen(x, y));
        }
    }

    fn draw_terrain(&self, graphics: &mut dyn Graphics, map: &Map, size: CanvasSize) {
        let dimensions = map.asset().dimensions;
        let first_x = (self.camera.x / TILE_SIZE).floor().max(0.0) as usize;
        let first_y = (self.camera.y / TILE_SIZE).floor().max(0.0) as usize;
        let last_x = (((self.camera.x + size.width as f32) / TILE_SIZE).ceil().max(0.0) as usize)
            .min(dimensions.width as usize);
        let last_y = (((self.camera.y + size.height as f32) / TILE_SIZE).ceil().max(0.0) as usize)
            .min(dimensions.height as usize);

        for tile_y in first_y..last_y {
            for tile_x in first_x..last_x {
                let Some(tile) = map.tile_at(tile_x, tile_y) else {
                    continue;
                };
                let screen = self
                    .camera
                    .to_screen(tile_x as f32 * TILE_SIZE, tile_y as f32 * TILE_SIZE);
                graphics.draw_image(
                    &tile.image,
                    screen.x,
                    screen.y,
                    ImagePlacement::Scaled {
                        width: TILE_SIZE,
                        height: TILE_SIZE,
                    },
                );
            }
        }
    }

    pub fn draw_fps(&self, graphics: &mut dyn Graphics, fps: u32) {
        graphics.draw_text(
            &format!("{}fps", fps),
            10.0,
            20.0,
            &TextStyle::new(FPS_FONT_SIZE, WHITE).with_stroke(BLACK, 1.0),
        );
    }

    /// Replaces whatever is shown with a centered status line.
    pub fn show_loading_message<G: FrameSink + ?Sized>(&self, graphics: &mut G, text: &str) {
        let size = graphics.size();
        let metrics = graphics.measure_text(text, LOADING_FONT_SIZE);

        graphics.clear_canvas();
        graphics.draw_text(
            text,
            (size.width as f32 - metrics.width) / 2.0,
            (size.height as f32 + metrics.height) / 2.0,
            &TextStyle::new(LOADING_FONT_SIZE, WHITE),
        );
        graphics.present();
    }
}

fn clamp_axis(start: f32, map_extent: f32, view_extent: f32) -> f32 {
    if map_extent <= view_extent {
        (map_extent - view_extent) / 2.0
    } else {
        start.clamp(0.0, map_extent - view_extent)
    }
}

/// Replays recorded frames into the macroquad window. Window thread only.
#[derive(Default)]
pub struct MacroquadCanvas {
    textures: HashMap<String, Texture2D>,
}

impl MacroquadCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, frame: &Frame) {
        for command in &frame.commands {
            match command {
                DrawCommand::Clear => clear_background(BACKGROUND),
                DrawCommand::Image {
                    image,
                    x,
                    y,
                    placement,
                } => {
                    let texture = self.texture(image);
                    let params = match *placement {
                        ImagePlacement::Natural => DrawTextureParams::default(),
                        ImagePlacement::Scaled { width, height } => DrawTextureParams {
                            dest_size: Some(vec2(width, height)),
                            ..Default::default()
                        },
                        ImagePlacement::Clipped {
                            source,
                            width,
                            height,
                        } => DrawTextureParams {
                            dest_size: Some(vec2(width, height)),
                            source: Some(source),
                            ..Default::default()
                        },
                    };
                    draw_texture_ex(&texture, *x, *y, WHITE, params);
                }
                DrawCommand::Text { text, x, y, style } => {
                    if let Some((color, thickness)) = style.stroke {
                        for (dx, dy) in [
                            (-thickness, 0.0),
                            (thickness, 0.0),
                            (0.0, -thickness),
                            (0.0, thickness),
                        ] {
                            draw_text(text, x + dx, y + dy, style.font_size, color);
                        }
                    }
                    draw_text(text, *x, *y, style.font_size, style.color);
                }
            }
        }
    }

    fn texture(&mut self, image: &ImageHandle) -> Texture2D {
        self.textures
            .entry(image.uri().to_string())
            .or_insert_with(|| {
                let texture = Texture2D::from_rgba8(image.width(), image.height(), image.rgba());
                texture.set_filter(FilterMode::Nearest);
                texture
            })
            .clone()
    }
}
