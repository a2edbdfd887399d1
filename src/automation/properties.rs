//! Automation definitions <-> property groups
//!
//! Each attribute is one group (`automation_trigger_0`, `automation_trigger_1`,
//! ...). The image group decides how many definitions exist; other groups
//! fill in their slot or leave the default.

use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use super::definition::AutomationDefinition;
use crate::properties::PropertyMap;
use crate::signature;

/// Property group of one automation attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationKey {
    Image,
    Type,
    Keys,
    Trigger,
    MinDelay,
    Timeout,
    MidiSignature,
    MinSimilarity,
    ScanRate,
    IsMovable,
    FocusedProgram,
}

impl AutomationKey {
    pub const ALL: [AutomationKey; 11] = [
        AutomationKey::Image,
        AutomationKey::Type,
        AutomationKey::Keys,
        AutomationKey::Trigger,
        AutomationKey::MinDelay,
        AutomationKey::Timeout,
        AutomationKey::MidiSignature,
        AutomationKey::MinSimilarity,
        AutomationKey::ScanRate,
        AutomationKey::IsMovable,
        AutomationKey::FocusedProgram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationKey::Image => "automation_image",
            AutomationKey::Type => "automation_type",
            AutomationKey::Keys => "automation_keys",
            AutomationKey::Trigger => "automation_trigger",
            AutomationKey::MinDelay => "automation_min_delay",
            AutomationKey::Timeout => "automation_timeout",
            AutomationKey::MidiSignature => "automation_midi_signature",
            AutomationKey::MinSimilarity => "automation_min_similarity",
            AutomationKey::ScanRate => "automation_scan_rate",
            AutomationKey::IsMovable => "automation_is_movable",
            AutomationKey::FocusedProgram => "automation_focused_program",
        }
    }
}

/// Build definitions from the automation property groups
pub fn read_definitions(map: &PropertyMap) -> Vec<AutomationDefinition> {
    map.group(AutomationKey::Image.as_str())
        .iter()
        .map(|(index, _)| {
            let mut def = AutomationDefinition {
                image: map
                    .group_value(AutomationKey::Image.as_str(), *index)
                    .map(PathBuf::from),
                ..Default::default()
            };

            let read = |key: AutomationKey| map.group_value(key.as_str(), *index);

            if let Some(v) = parse_slot(*index, AutomationKey::Type, read(AutomationKey::Type)) {
                def.action = v;
            }
            if let Some(v) = read(AutomationKey::Keys) {
                match parse_key_codes(v) {
                    Ok(keys) => def.key_codes = keys,
                    Err(e) => warn!("automation {}: bad key codes '{}': {}", index, v, e),
                }
            }
            if let Some(v) = parse_slot(*index, AutomationKey::Trigger, read(AutomationKey::Trigger)) {
                def.trigger = v;
            }
            if let Some(v) = parse_slot(*index, AutomationKey::MinDelay, read(AutomationKey::MinDelay)) {
                def.min_delay_ms = v;
            }
            if let Some(v) = parse_slot(*index, AutomationKey::Timeout, read(AutomationKey::Timeout)) {
                def.timeout_ms = v;
            }
            def.midi_signature = read(AutomationKey::MidiSignature).map(|sig| {
                signature::canonicalize(sig).unwrap_or_else(|e| {
                    warn!("automation {}: {}, it will never match", index, e);
                    sig.to_string()
                })
            });
            if let Some(v) =
                parse_slot::<f32>(*index, AutomationKey::MinSimilarity, read(AutomationKey::MinSimilarity))
            {
                def.min_similarity = v.clamp(0.0, 1.0);
            }
            if let Some(v) = parse_slot(*index, AutomationKey::ScanRate, read(AutomationKey::ScanRate)) {
                def.scan_rate = v;
            }
            if let Some(v) = parse_slot(*index, AutomationKey::IsMovable, read(AutomationKey::IsMovable)) {
                def.movable = v;
            }
            def.focused_program = read(AutomationKey::FocusedProgram).map(str::to_string);
            def
        })
        .collect()
}

/// Replace every automation group with `definitions`
pub fn write_definitions(map: &mut PropertyMap, definitions: &[AutomationDefinition]) {
    let column = |f: &dyn Fn(&AutomationDefinition) -> Option<String>| -> Vec<Option<String>> {
        definitions.iter().map(f).collect()
    };

    for key in AutomationKey::ALL {
        let values = match key {
            AutomationKey::Image => column(&|d| d.image.as_ref().map(|p| p.display().to_string())),
            AutomationKey::Type => column(&|d| Some(d.action.to_string())),
            AutomationKey::Keys => column(&|d| {
                Some(
                    d.key_codes
                        .iter()
                        .map(u32::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                )
            }),
            AutomationKey::Trigger => column(&|d| Some(d.trigger.to_string())),
            AutomationKey::MinDelay => column(&|d| Some(d.min_delay_ms.to_string())),
            AutomationKey::Timeout => column(&|d| Some(d.timeout_ms.to_string())),
            AutomationKey::MidiSignature => column(&|d| d.midi_signature.clone()),
            AutomationKey::MinSimilarity => column(&|d| Some(d.min_similarity.to_string())),
            AutomationKey::ScanRate => column(&|d| Some(d.scan_rate.to_string())),
            AutomationKey::IsMovable => column(&|d| Some(d.movable.to_string())),
            AutomationKey::FocusedProgram => column(&|d| d.focused_program.clone()),
        };
        map.set_group(key.as_str(), values);
    }
}

fn parse_slot<T>(index: usize, key: AutomationKey, value: Option<&str>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = value?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(
                "automation {}: ignoring {} '{}': {}",
                index,
                key.as_str(),
                value,
                e
            );
            None
        }
    }
}

fn parse_key_codes(text: &str) -> Result<Vec<u32>, std::num::ParseIntError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
