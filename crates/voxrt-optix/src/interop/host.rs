use std::collections::BTreeMap;

use super::{RasterInterop, TexImage2D};

/// Records raster state and uploads instead of issuing them
#[derive(Debug, Default)]
pub struct HostRaster {
    next_id: u32,
    pixel_buffers: BTreeMap<u32, usize>,
    texture: Option<u32>,
    unpack_buffer: Option<u32>,
    unpack_alignment: u32,
    uploads: Vec<Upload>,
}

/// One `tex_image_2d` call together with the state it was issued under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upload {
    pub texture: Option<u32>,
    pub source: Option<u32>,
    pub alignment: u32,
    pub image: TexImage2D,
}

impl HostRaster {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            unpack_alignment: 4,
            ..Default::default()
        }
    }

    pub fn pixel_buffer_size(&self, buffer: u32) -> Option<usize> {
        self.pixel_buffers.get(&buffer).copied()
    }

    pub fn live_pixel_buffers(&self) -> usize {
        self.pixel_buffers.len()
    }

    pub fn bound_texture(&self) -> Option<u32> {
        self.texture
    }

    pub fn bound_unpack_buffer(&self) -> Option<u32> {
        self.unpack_buffer
    }

    pub fn unpack_alignment(&self) -> u32 {
        self.unpack_alignment
    }

    pub fn uploads(&self) -> &[Upload] {
        &self.uploads
    }
}

impl RasterInterop for HostRaster {
    fn create_pixel_buffer(&mut self, size: usize) -> u32 {
        // `Default` leaves next_id at 0, which is the null name
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        self.pixel_buffers.insert(id, size);
        id
    }

    fn delete_pixel_buffer(&mut self, buffer: u32) {
        self.pixel_buffers.remove(&buffer);
        if self.unpack_buffer == Some(buffer) {
            self.unpack_buffer = None;
        }
    }

    fn bind_texture_2d(&mut self, texture: Option<u32>) {
        self.texture = texture;
    }

    fn bind_pixel_unpack_buffer(&mut self, buffer: Option<u32>) {
        self.unpack_buffer = buffer;
    }

    fn set_unpack_alignment(&mut self, alignment: u32) {
        self.unpack_alignment = alignment;
    }

    fn tex_image_2d(&mut self, image: &TexImage2D) {
        self.uploads.push(Upload {
            texture: self.texture,
            source: self.unpack_buffer,
            alignment: self.unpack_alignment,
            image: *image,
        });
    }
}
