//! The rasterization side of the interop seam: pixel buffer objects that the
//! device renders into, and the textures they get uploaded to for display.

use crate::{device::BufferFormat, error::SceneError};

mod host;

pub use host::{HostRaster, Upload};

/// A raster 3D texture holding packed volume bricks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasTexture(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalFormat {
    Rgba8,
    Rgba32F,
    Rgb32F,
    Luminance32F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra,
    Rgba,
    Rgb,
    Luminance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    UnsignedByte,
    Float,
}

/// Arguments of a 2D texture upload sourced from the bound unpack buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexImage2D {
    pub internal_format: InternalFormat,
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub pixel_type: PixelType,
}

impl TexImage2D {
    /// Upload description for a device surface of element format `format`
    pub fn for_surface(format: BufferFormat, width: usize, height: usize) -> Result<Self, SceneError> {
        let (internal_format, format, pixel_type) = match format {
            BufferFormat::UnsignedByte4 => (InternalFormat::Rgba8, PixelFormat::Bgra, PixelType::UnsignedByte),
            BufferFormat::Float4 => (InternalFormat::Rgba32F, PixelFormat::Rgba, PixelType::Float),
            BufferFormat::Float3 => (InternalFormat::Rgb32F, PixelFormat::Rgb, PixelType::Float),
            BufferFormat::Float => (InternalFormat::Luminance32F, PixelFormat::Luminance, PixelType::Float),
            other => return Err(SceneError::UnsupportedFormat(other)),
        };

        Ok(Self {
            internal_format,
            width,
            height,
            format,
            pixel_type,
        })
    }
}

/// Largest power of two (at most 8) dividing `element_size`
pub fn unpack_alignment(element_size: usize) -> u32 {
    if element_size % 8 == 0 {
        8
    } else if element_size % 4 == 0 {
        4
    } else if element_size % 2 == 0 {
        2
    } else {
        1
    }
}

/// Raster API calls the scene needs.
///
/// Ids are raster-side object names; 0 means "nothing bound".
pub trait RasterInterop {
    /// Allocates a pixel buffer object of `size` bytes
    fn create_pixel_buffer(&mut self, size: usize) -> u32;
    fn delete_pixel_buffer(&mut self, buffer: u32);
    fn bind_texture_2d(&mut self, texture: Option<u32>);
    fn bind_pixel_unpack_buffer(&mut self, buffer: Option<u32>);
    fn set_unpack_alignment(&mut self, alignment: u32);
    fn tex_image_2d(&mut self, image: &TexImage2D);
}
