use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::foundation::error::WavecastResult;
use crate::render::composite::{BlendMode, Composite, composite_layer};

/// A captured frame as RGBA8 pixels.
///
/// Frames are **premultiplied alpha**, tightly packed, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes.
    pub data: Vec<u8>,
}

impl FrameRGBA {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        pixel_at(&self.data, self.width, self.height, x, y)
    }

    /// Straight-alpha copy of the pixels, as PNG encoders expect.
    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        for px in out.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        out
    }
}

/// Canvas-2D-like draw state applied to every layer drawn onto the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawState {
    pub global_alpha: f32,
    pub blend_mode: BlendMode,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            global_alpha: 1.0,
            blend_mode: BlendMode::Normal,
        }
    }
}

/// The shared drawing target effects composite into.
#[derive(Debug)]
pub struct Surface {
    canvas: Canvas,
    data: Vec<u8>,
    state: DrawState,
    saved: Vec<DrawState>,
}

impl Surface {
    pub fn new(canvas: Canvas) -> WavecastResult<Self> {
        canvas.validate()?;
        Ok(Self {
            canvas,
            data: vec![0u8; canvas.rgba8_len()],
            state: DrawState::default(),
            saved: Vec::new(),
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn width(&self) -> u32 {
        self.canvas.width
    }

    pub fn height(&self) -> u32 {
        self.canvas.height
    }

    pub fn is_degenerate(&self) -> bool {
        self.canvas.is_degenerate()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self, color: Rgba8Premul) {
        let px = color.to_array();
        for d in self.data.chunks_exact_mut(4) {
            d.copy_from_slice(&px);
        }
    }

    pub fn draw_state(&self) -> DrawState {
        self.state
    }

    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.state.global_alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.state.blend_mode = mode;
    }

    pub fn save(&mut self) {
        self.saved.push(self.state);
    }

    /// Pop the last saved state. Unbalanced restores reset to the default state.
    pub fn restore(&mut self) {
        self.state = self.saved.pop().unwrap_or_default();
    }

    /// Number of outstanding `save` calls.
    pub fn save_depth(&self) -> usize {
        self.saved.len()
    }

    /// Draw a full-surface premultiplied layer using `composite`.
    pub fn draw_layer(&mut self, layer: &[u8], composite: Composite) -> WavecastResult<()> {
        if self.is_degenerate() {
            return Ok(());
        }
        composite_layer(&mut self.data, layer, composite)
    }

    pub fn snapshot(&self) -> FrameRGBA {
        FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data: self.data.clone(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        pixel_at(&self.data, self.canvas.width, self.canvas.height, x, y)
    }
}

fn pixel_at(data: &[u8], width: u32, height: u32, x: u32, y: u32) -> Option<[u8; 4]> {
    if x >= width || y >= height {
        return None;
    }
    let idx = ((y as usize) * (width as usize) + (x as usize)) * 4;
    let px = data.get(idx..idx + 4)?;
    Some([px[0], px[1], px[2], px[3]])
}
