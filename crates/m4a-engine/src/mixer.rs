//! Block mixer: channels into per-track buffers, audible tracks into master.

use m4a_ir::{AudioBuffer, ByteSource, Frame, MixingArgs, SAMPLES_PER_BUFFER};

use crate::track::Track;
use crate::voice_pool::VoicePool;

/// Scratch and per-track buffers for one playback context.
pub struct Mixer {
    scratch: Vec<Frame>,
    track_buffers: Vec<AudioBuffer>,
}

impl Mixer {
    pub fn new(num_tracks: usize) -> Self {
        Self {
            scratch: vec![Frame::silence(); SAMPLES_PER_BUFFER],
            track_buffers: (0..num_tracks).map(|_| AudioBuffer::new(SAMPLES_PER_BUFFER)).collect(),
        }
    }

    /// Resize for a new song and silence everything.
    pub fn reset(&mut self, num_tracks: usize) {
        self.track_buffers.resize_with(num_tracks, || AudioBuffer::new(SAMPLES_PER_BUFFER));
        for buf in &mut self.track_buffers {
            buf.silence();
        }
    }

    /// Dry output of each track for the last block.
    pub fn track_buffers(&self) -> &[AudioBuffer] {
        &self.track_buffers
    }

    /// Render every channel and sum the audible tracks into `master`.
    ///
    /// A track is audible unless it is muted, or some track is soloed and it
    /// is neither soloed nor marked harmony.
    pub fn mix(
        &mut self,
        rom: &dyn ByteSource,
        pool: &mut VoicePool,
        tracks: &[Track],
        args: &MixingArgs,
        master: &mut AudioBuffer,
    ) {
        for buf in &mut self.track_buffers {
            buf.silence();
        }
        for ch in pool.channels_mut() {
            let Some(target) = self.track_buffers.get_mut(ch.track_idx()) else {
                continue;
            };
            self.scratch.fill(Frame::silence());
            ch.process(rom, &mut self.scratch, args);
            target.mix_from(&self.scratch);
        }

        master.silence();
        let any_solo = tracks.iter().any(|t| t.solo);
        for (track, buf) in tracks.iter().zip(&self.track_buffers) {
            let audible = !track.muted && (!any_solo || track.solo || track.harmony);
            if audible {
                master.mix_from(buf.frames());
            }
        }
    }
}
