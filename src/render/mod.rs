//! CPU raster target and compositing.
//!
//! Every effect paints into its own [`layer::Layer`]; layers are drawn onto the single shared
//! [`surface::Surface`] with the surface's current alpha and blend mode.

/// Blend modes and premultiplied composite kernels.
pub mod composite;
/// Effect-local `vello_cpu` rasters.
pub mod layer;
/// The shared drawing surface.
pub mod surface;
