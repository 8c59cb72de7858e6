//! VoicePool: channel allocation, voice stealing and lifecycle.

use m4a_ir::CgbPolyphony;
use slotmap::{new_key_type, SlotMap};
use tracing::debug;

use crate::cgb_channel::CgbChannel;
use crate::channel::Channel;
use crate::sound_channel::SoundChannel;

new_key_type! {
    /// Handle of a DirectSound channel.
    pub struct SoundChannelId;
    /// Handle of a PSG channel.
    pub struct CgbChannelId;
}

/// All sounding channels of one playback context.
pub struct VoicePool {
    sound: SlotMap<SoundChannelId, SoundChannel>,
    cgb: SlotMap<CgbChannelId, CgbChannel>,
    /// DirectSound channel cap (0 = unlimited).
    max_channels: usize,
    polyphony: CgbPolyphony,
    next_order: u64,
}

impl VoicePool {
    pub fn new(max_channels: u8, polyphony: CgbPolyphony) -> Self {
        Self {
            sound: SlotMap::with_key(),
            cgb: SlotMap::with_key(),
            max_channels: max_channels as usize,
            polyphony,
            next_order: 0,
        }
    }

    /// Drop every channel.
    pub fn clear(&mut self) {
        self.sound.clear();
        self.cgb.clear();
        self.next_order = 0;
    }

    /// Sequence number for the next allocated channel.
    pub fn next_start_order(&mut self) -> u64 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    /// Add a DirectSound channel, stealing one if the pool is full.
    ///
    /// Only a releasing channel or one of lower or equal priority may be
    /// stolen. Returns `None` if the note had to be dropped.
    pub fn add_sound(&mut self, channel: SoundChannel) -> Option<SoundChannelId> {
        let live = self.sound.values().filter(|c| !c.is_dead()).count();
        if self.max_channels > 0 && live >= self.max_channels {
            let priority = channel.priority();
            let victim = self
                .sound
                .iter()
                .filter(|(_, c)| !c.is_dead() && (c.is_releasing() || c.priority() <= priority))
                .min_by_key(|(_, c)| (c.priority(), !c.is_releasing(), c.start_order()))
                .map(|(id, _)| id);
            match victim {
                Some(id) => {
                    debug!(track = channel.track_idx(), key = channel.note().midi_key_track_data, "stealing channel");
                    self.sound.remove(id);
                }
                None => {
                    debug!(track = channel.track_idx(), priority, "no channel available, dropping note");
                    return None;
                }
            }
        }
        Some(self.sound.insert(channel))
    }

    /// Add a PSG channel following the configured polyphony policy.
    pub fn add_cgb(&mut self, channel: CgbChannel) -> Option<CgbChannelId> {
        let hw = channel.hw_channel();
        match self.polyphony {
            CgbPolyphony::Poly => {}
            mono => {
                let priority = channel.priority();
                let blocked = self
                    .cgb
                    .values()
                    .any(|c| c.hw_channel() == hw && !c.is_releasing() && c.priority() > priority);
                if blocked {
                    debug!(track = channel.track_idx(), hw, "psg channel busy, dropping note");
                    return None;
                }
                if mono == CgbPolyphony::MonoStrict {
                    self.cgb.retain(|_, c| c.hw_channel() != hw);
                } else {
                    self.cgb.values_mut().filter(|c| c.hw_channel() == hw).for_each(|c| c.kill());
                }
            }
        }
        Some(self.cgb.insert(channel))
    }

    pub fn sound(&self, id: SoundChannelId) -> Option<&SoundChannel> {
        self.sound.get(id)
    }

    pub fn sound_mut(&mut self, id: SoundChannelId) -> Option<&mut SoundChannel> {
        self.sound.get_mut(id)
    }

    pub fn cgb(&self, id: CgbChannelId) -> Option<&CgbChannel> {
        self.cgb.get(id)
    }

    pub fn cgb_mut(&mut self, id: CgbChannelId) -> Option<&mut CgbChannel> {
        self.cgb.get_mut(id)
    }

    /// Every channel, DirectSound first.
    pub fn channels(&self) -> impl Iterator<Item = &dyn Channel> + '_ {
        let sound = self.sound.values().map(|c| c as &dyn Channel);
        sound.chain(self.cgb.values().map(|c| c as &dyn Channel))
    }

    /// Every channel, mutably.
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut dyn Channel> + '_ {
        let sound = self.sound.values_mut().map(|c| c as &mut dyn Channel);
        sound.chain(self.cgb.values_mut().map(|c| c as &mut dyn Channel))
    }

    /// Count one tick of note length on every channel.
    pub fn tick_notes(&mut self) {
        for ch in self.channels_mut() {
            ch.tick_note();
        }
    }

    /// Note-off for `key` on `track`.
    pub fn release_key(&mut self, track: usize, key: u8) {
        for ch in self.channels_mut() {
            if ch.track_idx() == track && ch.note().midi_key_track_data == key && !ch.is_releasing() {
                ch.release();
            }
        }
    }

    /// Release all tied notes of `track`.
    pub fn release_ties(&mut self, track: usize) {
        for ch in self.channels_mut() {
            if ch.track_idx() == track && ch.note().is_tie() {
                ch.release();
            }
        }
    }

    /// Push new track volume and pan to its channels.
    pub fn set_track_vol(&mut self, track: usize, vol: u8, pan: i8) {
        for ch in self.channels_mut().filter(|c| c.track_idx() == track && !c.is_dead()) {
            ch.set_vol(vol, pan);
        }
    }

    /// Push a new track pitch offset to its channels.
    pub fn set_track_pitch(&mut self, track: usize, pitch: i32) {
        for ch in self.channels_mut().filter(|c| c.track_idx() == track && !c.is_dead()) {
            ch.set_pitch(pitch);
        }
    }

    /// Keys of `track` that are held (not yet releasing).
    pub fn active_keys(&self, track: usize) -> u128 {
        self.channels()
            .filter(|c| c.track_idx() == track && !c.is_releasing())
            .fold(0, |keys, c| keys | 1u128 << (c.note().midi_key_track_data & 0x7F))
    }

    /// Remove channels whose envelope has finished.
    pub fn reap(&mut self) {
        self.sound.retain(|_, c| !c.is_dead());
        self.cgb.retain(|_, c| !c.is_dead());
    }

    /// Number of channels, including ones not yet reaped.
    pub fn len(&self) -> usize {
        self.sound.len() + self.cgb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if no channel can produce sound any more.
    pub fn all_dead(&self) -> bool {
        self.channels().all(|c| c.is_dead())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope_state::EnvState;
    use crate::instrument::{CgbVoice, SynthParams};
    use crate::sample_source::SynthShape;
    use crate::sound_channel::Waveform;
    use m4a_ir::{Adsr, EngineSoundMode, Note, ResamplerType};

    fn note(track: u8, key: u8, priority: u8, length: u8) -> Note {
        Note {
            length,
            midi_key_track_data: key,
            midi_key_pitch: key,
            velocity: 127,
            priority,
            track_idx: track,
            ..Default::default()
        }
    }

    fn synth(pool: &mut VoicePool, n: Note) -> SoundChannel {
        let params = SynthParams { shape: SynthShape::Saw, base_duty: 0x80, duty_depth: 0, duty_period: 0 };
        let order = pool.next_start_order();
        SoundChannel::new(n, Adsr::default(), Waveform::synth(params), ResamplerType::Linear, order)
    }

    fn square(pool: &mut VoicePool, n: Note) -> CgbChannel {
        let rom: Vec<u8> = Vec::new();
        let order = pool.next_start_order();
        let mode = EngineSoundMode::default();
        CgbChannel::new(&rom, n, Adsr::new(0, 0, 15, 0), CgbVoice::Square2 { duty: 2 }, &mode, ResamplerType::Nearest, order)
    }

    fn keys(pool: &VoicePool) -> Vec<u8> {
        let mut keys: Vec<u8> = pool.channels().map(|c| c.note().midi_key_track_data).collect();
        keys.sort();
        keys
    }

    #[test]
    fn steals_oldest_of_lowest_priority() {
        let mut pool = VoicePool::new(2, CgbPolyphony::Poly);
        let a = synth(&mut pool, note(0, 60, 5, 0));
        let b = synth(&mut pool, note(0, 61, 5, 0));
        pool.add_sound(a);
        pool.add_sound(b);
        let c = synth(&mut pool, note(0, 62, 5, 0));
        assert!(pool.add_sound(c).is_some());
        assert_eq!(keys(&pool), [61, 62]);
    }

    #[test]
    fn releasing_channel_is_stolen_first() {
        let mut pool = VoicePool::new(2, CgbPolyphony::Poly);
        let a = synth(&mut pool, note(0, 60, 5, 0));
        let b = synth(&mut pool, note(0, 61, 5, 0));
        pool.add_sound(a);
        pool.add_sound(b);
        pool.release_key(0, 61);
        let c = synth(&mut pool, note(0, 62, 5, 0));
        pool.add_sound(c);
        assert_eq!(keys(&pool), [60, 62]);
    }

    #[test]
    fn higher_priority_held_channel_is_never_stolen() {
        let mut pool = VoicePool::new(1, CgbPolyphony::Poly);
        let a = synth(&mut pool, note(0, 60, 10, 0));
        pool.add_sound(a);
        let b = synth(&mut pool, note(1, 61, 3, 0));
        assert!(pool.add_sound(b).is_none());
        assert_eq!(keys(&pool), [60]);
    }

    #[test]
    fn zero_cap_is_unlimited() {
        let mut pool = VoicePool::new(0, CgbPolyphony::Poly);
        for key in 0..40 {
            let ch = synth(&mut pool, note(0, key, 0, 0));
            pool.add_sound(ch);
        }
        assert_eq!(pool.len(), 40);
    }

    #[test]
    fn release_ties_only_touches_tied_notes() {
        let mut pool = VoicePool::new(0, CgbPolyphony::Poly);
        let tie = synth(&mut pool, note(0, 60, 0, 0));
        let timed = synth(&mut pool, note(0, 61, 0, 10));
        let other = synth(&mut pool, note(1, 62, 0, 0));
        let tie = pool.add_sound(tie).unwrap();
        let timed = pool.add_sound(timed).unwrap();
        let other = pool.add_sound(other).unwrap();
        pool.release_ties(0);
        assert!(pool.sound(tie).unwrap().is_releasing());
        assert!(!pool.sound(timed).unwrap().is_releasing());
        assert!(!pool.sound(other).unwrap().is_releasing());
        assert_eq!(pool.active_keys(0), 1u128 << 61);
    }

    #[test]
    fn tick_notes_releases_expired_notes() {
        let mut pool = VoicePool::new(0, CgbPolyphony::Poly);
        let ch = synth(&mut pool, note(0, 60, 0, 2));
        let id = pool.add_sound(ch).unwrap();
        pool.tick_notes();
        assert!(!pool.sound(id).unwrap().is_releasing());
        pool.tick_notes();
        assert_eq!(pool.sound(id).unwrap().state(), EnvState::Rel);
    }

    #[test]
    fn mono_strict_replaces_psg_channel() {
        let mut pool = VoicePool::new(0, CgbPolyphony::MonoStrict);
        let a = square(&mut pool, note(0, 60, 0, 0));
        let b = square(&mut pool, note(0, 64, 0, 0));
        pool.add_cgb(a);
        pool.add_cgb(b);
        assert_eq!(keys(&pool), [64]);
    }

    #[test]
    fn mono_smooth_kills_old_psg_channel() {
        let mut pool = VoicePool::new(0, CgbPolyphony::MonoSmooth);
        let a = square(&mut pool, note(0, 60, 0, 0));
        let b = square(&mut pool, note(0, 64, 0, 0));
        let a = pool.add_cgb(a).unwrap();
        pool.add_cgb(b);
        assert_eq!(pool.cgb(a).unwrap().state(), EnvState::Die);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn mono_keeps_higher_priority_psg_note() {
        let mut pool = VoicePool::new(0, CgbPolyphony::MonoStrict);
        let a = square(&mut pool, note(0, 60, 9, 0));
        let b = square(&mut pool, note(1, 64, 1, 0));
        pool.add_cgb(a);
        assert!(pool.add_cgb(b).is_none());
        assert_eq!(keys(&pool), [60]);
    }

    #[test]
    fn poly_allows_overlap() {
        let mut pool = VoicePool::new(0, CgbPolyphony::Poly);
        let a = square(&mut pool, note(0, 60, 0, 0));
        let b = square(&mut pool, note(0, 64, 0, 0));
        pool.add_cgb(a);
        pool.add_cgb(b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn reap_removes_dead_channels() {
        let mut pool = VoicePool::new(0, CgbPolyphony::Poly);
        let ch = synth(&mut pool, note(0, 60, 0, 0));
        let id = pool.add_sound(ch).unwrap();
        assert!(!pool.all_dead());
        let rom: Vec<u8> = Vec::new();
        let args = m4a_ir::MixingArgs::new(&m4a_ir::Mp2kSoundMode::default());
        let mut out = vec![m4a_ir::Frame::silence(); 16];
        pool.sound_mut(id).unwrap().kill();
        pool.sound_mut(id).unwrap().process(&rom, &mut out, &args);
        assert!(pool.all_dead());
        pool.reap();
        assert!(pool.is_empty());
    }
}
