//! Signature codec
//!
//! A signature is the canonical text form of a channel-voice message, e.g.
//! `channel 1: CONTROL CHANGE 102 value: 0`. Signatures are what playlist
//! items, automations and the configuration store, and all matching between
//! configured and observed MIDI is done by string equality on them.

use std::collections::HashSet;

use crate::error::{AutomatorError, Result};
use crate::midi::MidiMessage;

/// Channel (0-based) of the reserved unique-signature space
pub const RESERVED_CHANNEL: u8 = 15;

/// Control value used by every reserved signature
pub const RESERVED_VALUE: u8 = 127;

/// Channel (0-based) of the remote open message
pub const REMOTE_OPEN_CHANNEL: u8 = 0;

/// Control number of the remote open message, its value is the item index
pub const REMOTE_OPEN_CONTROL: u8 = 102;

const TYPE_NAMES: [(&str, u8); 7] = [
    ("NOTE OFF", 0x80),
    ("NOTE ON", 0x90),
    ("POLY PRESSURE", 0xA0),
    ("CONTROL CHANGE", 0xB0),
    ("PROGRAM CHANGE", 0xC0),
    ("CHANNEL PRESSURE", 0xD0),
    ("PITCH BEND", 0xE0),
];

fn type_name(status_nibble: u8) -> &'static str {
    TYPE_NAMES
        .iter()
        .find(|(_, nibble)| *nibble == status_nibble)
        .map(|(name, _)| *name)
        .unwrap_or("UNKNOWN")
}

/// Encode a message into its canonical signature
pub fn encode(msg: &MidiMessage) -> String {
    let head = format!(
        "channel {}: {} {}",
        msg.channel() + 1,
        type_name(msg.status_nibble()),
        msg.data1()
    );
    match msg.data2() {
        Some(d2) => format!("{} value: {}", head, d2),
        None => head,
    }
}

/// Decode a signature back into a message
///
/// Whitespace around tokens is tolerated. A note-on with value 0 decodes to
/// a note-off, like it does on the wire.
pub fn decode(signature: &str) -> Result<MidiMessage> {
    let invalid = || AutomatorError::InvalidSignature(signature.to_string());

    let rest = signature
        .trim()
        .strip_prefix("channel")
        .ok_or_else(invalid)?;
    let (channel, rest) = rest.split_once(':').ok_or_else(invalid)?;
    let channel: u8 = channel.trim().parse().map_err(|_| invalid())?;
    if !(1..=16).contains(&channel) {
        return Err(invalid());
    }

    let rest = rest.trim_start();
    let (nibble, rest) = TYPE_NAMES
        .iter()
        .find_map(|(name, nibble)| rest.strip_prefix(name).map(|r| (*nibble, r)))
        .ok_or_else(invalid)?;

    let (d1, d2) = match rest.split_once("value:") {
        Some((d1, d2)) => (d1, Some(d2)),
        None => (rest, None),
    };
    let data_byte = |s: &str| -> Result<u8> {
        match s.trim().parse::<u8>() {
            Ok(b) if b <= 0x7F => Ok(b),
            _ => Err(invalid()),
        }
    };
    let d1 = data_byte(d1)?;
    let d2 = d2.map(data_byte).transpose()?;

    let mut bytes = vec![nibble | (channel - 1), d1];
    let two_bytes = !matches!(nibble, 0xC0 | 0xD0);
    match (two_bytes, d2) {
        (true, Some(d2)) => bytes.push(d2),
        (false, None) => {}
        _ => return Err(invalid()),
    }

    MidiMessage::parse(&bytes).ok_or_else(invalid)
}

/// Normalize a user supplied signature to its canonical text
pub fn canonicalize(signature: &str) -> Result<String> {
    decode(signature).map(|msg| encode(&msg))
}

/// Reserved signature for one control number
pub fn reserved_signature(control: u8) -> String {
    encode(&MidiMessage::ControlChange {
        channel: RESERVED_CHANNEL,
        cc: control,
        value: RESERVED_VALUE,
    })
}

/// First reserved signature (control 1..127 ascending) not in `existing`
///
/// Returns `None` once all 127 reserved signatures are taken.
pub fn find_unused_signature<'a, I>(existing: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let used: HashSet<&str> = existing.into_iter().collect();
    (1..=127u8)
        .map(reserved_signature)
        .find(|candidate| !used.contains(candidate.as_str()))
}

/// Message telling peers the playlist position changed to `index`
pub fn remote_open_message(index: usize) -> Option<MidiMessage> {
    let value = u8::try_from(index).ok().filter(|v| *v <= 0x7F)?;
    Some(MidiMessage::ControlChange {
        channel: REMOTE_OPEN_CHANNEL,
        cc: REMOTE_OPEN_CONTROL,
        value,
    })
}

/// Index carried by a remote open message, if `msg` is one
pub fn remote_open_index(msg: &MidiMessage) -> Option<usize> {
    match *msg {
        MidiMessage::ControlChange { channel, cc, value }
            if channel == REMOTE_OPEN_CHANNEL && cc == REMOTE_OPEN_CONTROL =>
        {
            Some(value as usize)
        }
        _ => None,
    }
}
