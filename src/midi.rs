//! MIDI channel-voice messages
//!
//! Only channel-voice messages can be bound to playlist items or automations,
//! so system messages (clock, SysEx, ...) are dropped at parse time.

use std::fmt;

/// Channel-voice MIDI message, channels are 0-based (0-15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiMessage {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value, `lsb | msb << 7`
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a channel-voice message from raw bytes
    ///
    /// Returns `None` for system messages, running status and truncated input.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }

        let channel = status & 0x0F;
        let d1 = rest.first().map(|b| b & 0x7F);
        let d2 = rest.get(1).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: d1?,
                velocity: d2?,
            }),
            0x90 => {
                let (note, velocity) = (d1?, d2?);
                // Note On with velocity 0 is a Note Off
                if velocity == 0 {
                    Some(MidiMessage::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    })
                } else {
                    Some(MidiMessage::NoteOn {
                        channel,
                        note,
                        velocity,
                    })
                }
            }
            0xA0 => Some(MidiMessage::PolyPressure {
                channel,
                note: d1?,
                pressure: d2?,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: d1?,
                value: d2?,
            }),
            0xC0 => Some(MidiMessage::ProgramChange {
                channel,
                program: d1?,
            }),
            0xD0 => Some(MidiMessage::ChannelPressure {
                channel,
                pressure: d1?,
            }),
            0xE0 => {
                let (lsb, msb) = (d1? as u16, d2? as u16);
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        let status = self.status_nibble() | self.channel();
        match self.data2() {
            Some(d2) => vec![status, self.data1(), d2],
            None => vec![status, self.data1()],
        }
    }

    /// Channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::PolyPressure { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel & 0x0F,
        }
    }

    /// Upper status nibble (0x80..=0xE0)
    pub fn status_nibble(&self) -> u8 {
        match self {
            MidiMessage::NoteOff { .. } => 0x80,
            MidiMessage::NoteOn { .. } => 0x90,
            MidiMessage::PolyPressure { .. } => 0xA0,
            MidiMessage::ControlChange { .. } => 0xB0,
            MidiMessage::ProgramChange { .. } => 0xC0,
            MidiMessage::ChannelPressure { .. } => 0xD0,
            MidiMessage::PitchBend { .. } => 0xE0,
        }
    }

    /// First data byte
    pub fn data1(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { note, .. }
            | MidiMessage::NoteOn { note, .. }
            | MidiMessage::PolyPressure { note, .. } => note & 0x7F,
            MidiMessage::ControlChange { cc, .. } => cc & 0x7F,
            MidiMessage::ProgramChange { program, .. } => program & 0x7F,
            MidiMessage::ChannelPressure { pressure, .. } => pressure & 0x7F,
            MidiMessage::PitchBend { value, .. } => (value & 0x7F) as u8,
        }
    }

    /// Second data byte, `None` for one-data-byte messages
    pub fn data2(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOff { velocity, .. } | MidiMessage::NoteOn { velocity, .. } => {
                Some(velocity & 0x7F)
            }
            MidiMessage::PolyPressure { pressure, .. } => Some(pressure & 0x7F),
            MidiMessage::ControlChange { value, .. } => Some(value & 0x7F),
            MidiMessage::PitchBend { value, .. } => Some(((value >> 7) & 0x7F) as u8),
            MidiMessage::ProgramChange { .. } | MidiMessage::ChannelPressure { .. } => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::PolyPressure { channel, note, pressure } => {
                write!(f, "PolyPressure ch:{} n:{} p:{}", channel + 1, note, pressure)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "ChannelPressure ch:{} p:{}", channel + 1, pressure)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
