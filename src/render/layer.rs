use std::sync::Arc;

use crate::foundation::core::{Affine, Canvas};
use crate::foundation::error::{WavecastError, WavecastResult};

/// Effect-local transparent raster.
///
/// Style nodes paint into a layer with a retained `vello_cpu` context; the transform node then
/// presents the layer onto the shared [`Surface`](crate::render::surface::Surface).
pub struct Layer {
    canvas: Canvas,
    raster: Option<Raster>,
    painted: bool,
}

struct Raster {
    width: u16,
    height: u16,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("canvas", &self.canvas)
            .field("painted", &self.painted)
            .finish_non_exhaustive()
    }
}

impl Layer {
    pub fn new(canvas: Canvas) -> WavecastResult<Self> {
        let raster = if canvas.is_degenerate() {
            None
        } else {
            let (width, height) = canvas_u16(canvas)?;
            Some(Raster {
                width,
                height,
                ctx: vello_cpu::RenderContext::new(width, height),
                pixmap: vello_cpu::Pixmap::new(width, height),
            })
        };
        Ok(Self {
            canvas,
            raster,
            painted: false,
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn is_degenerate(&self) -> bool {
        self.raster.is_none()
    }

    /// Whether anything was painted since the last [`Layer::clear`].
    pub fn is_painted(&self) -> bool {
        self.painted
    }

    /// Resize to `canvas`, discarding contents. No-op when the size is unchanged.
    pub fn ensure_size(&mut self, canvas: Canvas) -> WavecastResult<()> {
        if canvas == self.canvas {
            return Ok(());
        }
        *self = Self::new(canvas)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        if let Some(r) = self.raster.as_mut() {
            r.pixmap.data_as_u8_slice_mut().fill(0);
        }
        self.painted = false;
    }

    /// Replace the layer contents with whatever `draw` records.
    ///
    /// Degenerate layers skip `draw` entirely.
    pub fn paint<F>(&mut self, draw: F) -> WavecastResult<()>
    where
        F: FnOnce(&mut vello_cpu::RenderContext) -> WavecastResult<()>,
    {
        let Some(r) = self.raster.as_mut() else {
            return Ok(());
        };
        r.ctx.reset();
        r.ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        r.ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        draw(&mut r.ctx)?;
        r.ctx.flush();
        r.ctx.render_to_pixmap(&mut r.pixmap);
        self.painted = true;
        Ok(())
    }

    /// Premultiplied RGBA8 contents (empty for degenerate layers).
    pub fn data(&self) -> &[u8] {
        match self.raster.as_ref() {
            Some(r) => r.pixmap.data_as_u8_slice(),
            None => &[],
        }
    }

    /// Render the layer warped through `transform` into a fresh buffer of the same size.
    pub fn transformed(&mut self, transform: Affine) -> WavecastResult<Vec<u8>> {
        let Some(r) = self.raster.as_mut() else {
            return Ok(Vec::new());
        };
        let source = premul_bytes_to_pixmap(
            r.pixmap.data_as_u8_slice(),
            u32::from(r.width),
            u32::from(r.height),
        )?;
        let paint = pixmap_paint(source);

        r.ctx.reset();
        r.ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        r.ctx.set_transform(affine_to_cpu(transform));
        r.ctx.set_paint(paint);
        r.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(r.width),
            f64::from(r.height),
        ));
        r.ctx.flush();

        let mut out = vello_cpu::Pixmap::new(r.width, r.height);
        r.ctx.render_to_pixmap(&mut out);
        Ok(out.data_as_u8_slice().to_vec())
    }
}

fn canvas_u16(canvas: Canvas) -> WavecastResult<(u16, u16)> {
    let w: u16 = canvas
        .width
        .try_into()
        .map_err(|_| WavecastError::render("layer width exceeds u16"))?;
    let h: u16 = canvas
        .height
        .try_into()
        .map_err(|_| WavecastError::render("layer height exceeds u16"))?;
    Ok((w, h))
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn pixmap_paint(pixmap: vello_cpu::Pixmap) -> vello_cpu::Image {
    vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    }
}

pub(crate) fn premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> WavecastResult<vello_cpu::Pixmap> {
    let (w, h) = canvas_u16(Canvas::new(width, height))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(WavecastError::render("image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        let a = px[3];
        may_have_opacities |= a != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a,
        });
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/render/layer.rs"]
mod tests;
