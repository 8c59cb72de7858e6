//! Common interface of sounding channels.

use m4a_ir::{ByteSource, Frame, MixingArgs, Note};

use crate::envelope_state::EnvState;

/// Behaviour shared by DirectSound and PSG channels.
///
/// The voice pool and mixer only talk to channels through this trait.
pub trait Channel {
    /// The note that started this channel.
    fn note(&self) -> &Note;

    fn state(&self) -> EnvState;

    /// Allocation sequence number, lower is older.
    fn start_order(&self) -> u64;

    /// Set track volume (0-127) and pan (-64..=63).
    fn set_vol(&mut self, vol: u8, pan: i8);

    /// Set the pitch offset in 1/64 semitones.
    fn set_pitch(&mut self, pitch: i32);

    /// Note-off.
    fn release(&mut self);

    /// Fade out within one block, entering `Die` from any earlier state.
    fn kill(&mut self);

    /// Count one sequencer tick of note length. Returns true while held.
    fn tick_note(&mut self) -> bool;

    /// Render one block, adding into `out`.
    fn process(&mut self, rom: &dyn ByteSource, out: &mut [Frame], args: &MixingArgs);

    fn priority(&self) -> u8 {
        self.note().priority
    }

    fn track_idx(&self) -> usize {
        self.note().track_idx as usize
    }

    fn is_releasing(&self) -> bool {
        self.state().is_releasing()
    }

    fn is_dead(&self) -> bool {
        self.state() == EnvState::Dead
    }
}
