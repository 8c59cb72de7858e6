//! No reverb.

use m4a_ir::Frame;

use super::Reverb;

pub struct PassthroughReverb;

impl Reverb for PassthroughReverb {
    fn process(&mut self, _frames: &mut [Frame]) {}
    fn reset(&mut self) {}
}
