//! Envelope state machine shared by all channel kinds, plus the
//! DirectSound envelope generator.

use m4a_ir::{Adsr, Note};

/// Envelope phase of a sounding channel, in forward order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvState {
    #[default]
    Init,
    Atk,
    Dec,
    Sus,
    Rel,
    PseudoEcho,
    Die,
    Dead,
}

impl EnvState {
    /// True at or past the release phase.
    pub fn is_releasing(self) -> bool {
        self >= EnvState::Rel
    }

    /// True if the envelope may move from `self` to `next` in one step.
    ///
    /// Covers the natural progression plus forced release and kill. `step`
    /// alone only skips from `Rel` to `Die`; the other edges into `Die` exist
    /// for [`Envelope::kill`].
    pub fn can_transition_to(self, next: EnvState) -> bool {
        use EnvState::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Dead, _) => false,
            (Init, Atk) | (Atk, Dec) | (Dec, Sus) => true,
            (Init | Atk | Dec | Sus, Rel) => true,
            (Rel, PseudoEcho) => true,
            (_, Die) => true,
            (Die, Dead) => true,
            _ => false,
        }
    }
}

/// Volume envelope of a DirectSound channel (levels 0-255).
///
/// Steps once per block. `prev_level` is the level at the end of the
/// previous block so the renderer can ramp between the two.
#[derive(Clone, Debug)]
pub struct Envelope {
    state: EnvState,
    level: u8,
    prev_level: u8,
    adsr: Adsr,
    echo_vol: u8,
    echo_len: u8,
    echo_left: u8,
}

impl Envelope {
    pub fn new(adsr: Adsr, note: &Note) -> Self {
        let (echo_vol, echo_len) = if note.has_pseudo_echo() {
            (note.pseudo_echo_vol, note.pseudo_echo_len)
        } else {
            (0, 0)
        };
        Self { state: EnvState::Init, level: 0, prev_level: 0, adsr, echo_vol, echo_len, echo_left: 0 }
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn prev_level(&self) -> u8 {
        self.prev_level
    }

    /// Note-off: anything before the release phase jumps to `Rel`.
    pub fn release(&mut self) {
        if !self.state.is_releasing() {
            self.state = EnvState::Rel;
        }
    }

    /// Force a one-block fade to silence.
    ///
    /// Jumps straight to `Die` from any earlier state. Used when a voice is
    /// taken over by a newer note on the same PSG channel or its sample data
    /// runs out; the `Die` block still ramps the last level down to zero.
    pub fn kill(&mut self) {
        if self.state < EnvState::Die {
            self.state = EnvState::Die;
        }
    }

    /// Advance by one block.
    pub fn step(&mut self) {
        self.prev_level = self.level;
        match self.state {
            EnvState::Init => {
                self.level = 0;
                self.state = EnvState::Atk;
            }
            EnvState::Atk => {
                let next = self.level as u16 + self.adsr.att as u16;
                if next >= 0xFF {
                    self.level = 0xFF;
                    self.state = EnvState::Dec;
                } else {
                    self.level = next as u8;
                }
            }
            EnvState::Dec => {
                self.level = scale(self.level, self.adsr.dec);
                if self.level <= self.adsr.sus {
                    self.level = self.adsr.sus;
                    self.state = EnvState::Sus;
                }
            }
            EnvState::Sus => {}
            EnvState::Rel => {
                self.level = scale(self.level, self.adsr.rel);
                if self.echo_len > 0 && self.level <= self.echo_vol {
                    self.level = self.echo_vol;
                    self.echo_left = self.echo_len;
                    self.state = EnvState::PseudoEcho;
                } else if self.level == 0 {
                    self.state = EnvState::Die;
                }
            }
            EnvState::PseudoEcho => {
                self.echo_left = self.echo_left.saturating_sub(1);
                self.level = (self.echo_vol as u32 * self.echo_left as u32 / self.echo_len as u32) as u8;
                if self.echo_left == 0 {
                    self.state = EnvState::Die;
                }
            }
            EnvState::Die => {
                self.level = 0;
                self.state = EnvState::Dead;
            }
            EnvState::Dead => {
                self.level = 0;
            }
        }
    }
}

fn scale(level: u8, factor: u8) -> u8 {
    ((level as u16 * factor as u16) >> 8) as u8
}
