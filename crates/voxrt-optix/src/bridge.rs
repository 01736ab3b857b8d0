//! Device resources shared with the raster side: the output surface the
//! device renders into and the sampler over the volume brick atlas.

use tracing::{debug, info, warn};

use crate::{
    bindings,
    device::{BufferDesc, BufferFormat, BufferHandle, BufferKind, Device, Node, SamplerDesc, SamplerHandle, Scope, Value},
    error::{ResultExt, SceneResult},
    interop::{AtlasTexture, RasterInterop, TexImage2D, unpack_alignment},
};

/// Device output buffer backed by a raster pixel buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSurface {
    buffer: BufferHandle,
    pixel_buffer: u32,
    format: BufferFormat,
    width: usize,
    height: usize,
}

impl OutputSurface {
    pub fn create<D, R>(
        device: &mut D,
        raster: &mut R,
        format: BufferFormat,
        width: usize,
        height: usize,
    ) -> SceneResult<Self>
    where
        D: Device + ?Sized,
        R: RasterInterop + ?Sized,
    {
        info!("creating {width}x{height} {format:?} output surface");

        let desc = BufferDesc::image(BufferKind::OUTPUT, format, width, height);
        let pixel_buffer = raster.create_pixel_buffer(desc.byte_size());
        let buffer = match device.create_buffer_from_gl(desc, pixel_buffer) {
            Ok(buffer) => buffer,
            Err(e) => {
                raster.delete_pixel_buffer(pixel_buffer);
                return Err(e).creating("output surface");
            }
        };

        Ok(Self {
            buffer,
            pixel_buffer,
            format,
            width,
            height,
        })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn pixel_buffer(&self) -> u32 {
        self.pixel_buffer
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Device-to-device upload of the last frame into the raster texture
    /// `texture`. Unsupported surface formats are rejected before any raster
    /// state is touched.
    pub fn copy_to_texture<D, R>(&self, device: &D, raster: &mut R, texture: u32) -> SceneResult<()>
    where
        D: Device + ?Sized,
        R: RasterInterop + ?Sized,
    {
        let desc = device.buffer_desc(self.buffer).creating("output surface")?;
        let image = TexImage2D::for_surface(desc.format, desc.width, desc.height)?;
        let source = device
            .buffer_gl_id(self.buffer)
            .creating("output surface")?
            .unwrap_or(self.pixel_buffer);

        raster.bind_texture_2d(Some(texture));
        raster.bind_pixel_unpack_buffer(Some(source));
        raster.set_unpack_alignment(unpack_alignment(desc.format.element_size()));
        raster.tex_image_2d(&image);
        raster.bind_pixel_unpack_buffer(None);
        raster.bind_texture_2d(None);

        Ok(())
    }

    pub fn destroy<D, R>(self, device: &mut D, raster: &mut R) -> SceneResult<()>
    where
        D: Device + ?Sized,
        R: RasterInterop + ?Sized,
    {
        device
            .destroy(Node::Buffer(self.buffer))
            .creating("output surface teardown")?;
        raster.delete_pixel_buffer(self.pixel_buffer);
        Ok(())
    }
}

/// The scene's single sampler over a raster volume atlas
#[derive(Debug, Default)]
pub struct VolumeSampler {
    live: Option<(SamplerHandle, AtlasTexture)>,
}

impl VolumeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<(SamplerHandle, AtlasTexture)> {
        self.live
    }

    /// Points the sampler at `atlas` and republishes it to the volume texture
    /// slot. The previous sampler is destroyed only once the new one is
    /// published; on error the previous binding is left in place.
    pub fn bind<D: Device + ?Sized>(&mut self, device: &mut D, atlas: AtlasTexture) -> SceneResult<SamplerHandle> {
        let sampler = device
            .create_texture_sampler_from_gl(atlas.0, &SamplerDesc::volume_atlas())
            .creating(format!("volume sampler over atlas {}", atlas.0))?;
        if let Err(e) = device.set_variable(Scope::Context, bindings::VOL_TEX_IN, Value::Sampler(sampler)) {
            if let Err(cleanup) = device.destroy(Node::Sampler(sampler)) {
                warn!("failed to destroy unpublished volume sampler: {cleanup}");
            }
            return Err(e).creating(format!("`{}` binding", bindings::VOL_TEX_IN));
        }

        let previous = self.live.replace((sampler, atlas));
        if let Some((old, _)) = previous {
            device
                .destroy(Node::Sampler(old))
                .creating("volume sampler teardown")?;
        }
        debug!("volume sampler bound to atlas {}", atlas.0);

        Ok(sampler)
    }

    pub fn release<D: Device + ?Sized>(&mut self, device: &mut D) -> SceneResult<()> {
        if let Some((sampler, _)) = self.live.take() {
            device
                .destroy(Node::Sampler(sampler))
                .creating("volume sampler teardown")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ErrorKind, SceneError,
        device::HostDevice,
        interop::{HostRaster, PixelFormat},
    };

    #[test]
    fn surface_pixel_buffer_matches_element_size() {
        let mut device = HostDevice::new(".");
        let mut raster = HostRaster::new();

        let surface = OutputSurface::create(&mut device, &mut raster, BufferFormat::Float4, 8, 2).unwrap();
        assert_eq!(raster.pixel_buffer_size(surface.pixel_buffer()), Some(16 * 8 * 2));
        assert_eq!(device.buffer_gl_id(surface.buffer()).unwrap(), Some(surface.pixel_buffer()));
    }

    #[test]
    fn copy_binds_then_restores_raster_state() {
        let mut device = HostDevice::new(".");
        let mut raster = HostRaster::new();
        let surface = OutputSurface::create(&mut device, &mut raster, BufferFormat::Float3, 4, 4).unwrap();

        surface.copy_to_texture(&device, &mut raster, 77).unwrap();

        let upload = raster.uploads()[0];
        assert_eq!(upload.texture, Some(77));
        assert_eq!(upload.source, Some(surface.pixel_buffer()));
        assert_eq!(upload.alignment, 4);
        assert_eq!(upload.image.format, PixelFormat::Rgb);
        assert_eq!(raster.bound_texture(), None);
        assert_eq!(raster.bound_unpack_buffer(), None);
    }

    #[test]
    fn unsupported_surface_leaves_raster_untouched() {
        let mut device = HostDevice::new(".");
        let mut raster = HostRaster::new();
        let surface = OutputSurface::create(&mut device, &mut raster, BufferFormat::Float2, 4, 4).unwrap();

        let err = surface.copy_to_texture(&device, &mut raster, 5).unwrap_err();
        assert!(matches!(err, SceneError::UnsupportedFormat(BufferFormat::Float2)));
        assert!(raster.uploads().is_empty());
        assert_eq!(raster.bound_texture(), None);
    }

    #[test]
    fn copy_from_a_destroyed_surface_is_a_creation_error() {
        let mut device = HostDevice::new(".");
        let mut raster = HostRaster::new();
        let surface = OutputSurface::create(&mut device, &mut raster, BufferFormat::Float4, 4, 4).unwrap();
        device.destroy(Node::Buffer(surface.buffer())).unwrap();

        let err = surface.copy_to_texture(&device, &mut raster, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
        assert!(err.to_string().contains("output surface"));
        assert!(raster.uploads().is_empty());
    }

    #[test]
    fn failed_rebind_keeps_the_previous_sampler() {
        let mut device = HostDevice::new(".");
        let mut sampler = VolumeSampler::new();
        let first = sampler.bind(&mut device, AtlasTexture(3)).unwrap();

        let err = sampler.bind(&mut device, AtlasTexture(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);

        assert_eq!(sampler.current(), Some((first, AtlasTexture(3))));
        assert_eq!(device.samplers().len(), 1);
        assert_eq!(
            device.variable(Scope::Context, bindings::VOL_TEX_IN),
            Some(&Value::Sampler(first))
        );
    }

    #[test]
    fn rebinding_replaces_the_sampler() {
        let mut device = HostDevice::new(".");
        let mut sampler = VolumeSampler::new();

        let first = sampler.bind(&mut device, AtlasTexture(3)).unwrap();
        let second = sampler.bind(&mut device, AtlasTexture(9)).unwrap();

        assert_ne!(first, second);
        let live = device.samplers();
        assert_eq!(live.len(), 1);
        assert_eq!((live[0].0, live[0].1), (second, 9));
        assert_eq!(live[0].2, SamplerDesc::volume_atlas());
        assert_eq!(
            device.variable(Scope::Context, bindings::VOL_TEX_IN),
            Some(&Value::Sampler(second))
        );
    }
}
