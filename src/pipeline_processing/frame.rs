/// Opaque reference to a GPU-resident image.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct TextureInfo {
    pub texture_id: u32,
    pub framebuffer_id: u32,
    pub width: u32,
    pub height: u32,
}

impl TextureInfo {
    pub fn new(texture_id: u32, framebuffer_id: u32, width: u32, height: u32) -> Self {
        Self { texture_id, framebuffer_id, width, height }
    }
}

/// An entry waiting to be handed to the consuming stage: either a frame or the
/// marker that the current input stream has ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PendingFrame {
    Frame { texture: TextureInfo, presentation_time_us: i64 },
    EndOfStream,
}

impl PendingFrame {
    pub fn is_end_of_stream(&self) -> bool { matches!(self, PendingFrame::EndOfStream) }
}
