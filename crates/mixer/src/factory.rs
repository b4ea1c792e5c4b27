//! Frame factory bound to the software mixer.

use po_common::{FrameFactory, VideoFormatDesc};

/// Allocates CPU-side frame storage at the target format.
pub struct MixerFrameFactory {
    desc: VideoFormatDesc,
}

impl MixerFrameFactory {
    pub fn new(desc: VideoFormatDesc) -> Self {
        Self { desc }
    }
}

impl FrameFactory for MixerFrameFactory {
    fn format_desc(&self) -> &VideoFormatDesc {
        &self.desc
    }
}
