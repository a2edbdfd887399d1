//! MIDI transport
//!
//! Devices are addressed by role ([`DeviceKey`]) and bound to system ports by
//! case-insensitive substring match. Outbound traffic is sent as signatures;
//! inbound bytes are forwarded untouched on one channel for the dispatcher.

use anyhow::{anyhow, Context};
use midir::{MidiIO, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MidiConfig;
use crate::error::{AutomatorError, Result};
use crate::midi::format_hex;
use crate::signature;

const CLIENT_NAME: &str = "MIDI-Automator";

/// Role of a MIDI device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceKey {
    /// Prev/next and item listen signatures
    SwitchCommandIn,
    /// Remote open from a master instance
    RemoteIn,
    /// Input named by an automation trigger
    AutomationTriggerIn(String),
    /// Remote open towards slave instances
    RemoteOut,
    /// Switch notifier on every open
    SwitchNotifierOut,
    /// Send signature of the opened item
    SwitchItemOut,
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKey::SwitchCommandIn => f.write_str("switch command in"),
            DeviceKey::RemoteIn => f.write_str("remote in"),
            DeviceKey::AutomationTriggerIn(device) => write!(f, "trigger in ({})", device),
            DeviceKey::RemoteOut => f.write_str("remote out"),
            DeviceKey::SwitchNotifierOut => f.write_str("switch notifier out"),
            DeviceKey::SwitchItemOut => f.write_str("switch item out"),
        }
    }
}

/// Raw message received on an input device
#[derive(Debug, Clone)]
pub struct InboundMidi {
    pub device: DeviceKey,
    pub raw: Vec<u8>,
    pub received_at: Instant,
}

/// Outbound MIDI collaborator
pub trait MidiTransport: Send + Sync {
    /// Send the message a signature describes, unconfigured devices are skipped
    fn send(&self, device: &DeviceKey, signature: &str) -> Result<()>;
}

/// Transport over system MIDI ports
pub struct MidirTransport {
    outputs: Mutex<HashMap<DeviceKey, MidiOutputConnection>>,
    inputs: Mutex<HashMap<DeviceKey, MidiInputConnection<()>>>,
    inbound_tx: mpsc::Sender<InboundMidi>,
}

impl MidirTransport {
    pub fn new(inbound_tx: mpsc::Sender<InboundMidi>) -> Self {
        Self {
            outputs: Mutex::new(HashMap::new()),
            inputs: Mutex::new(HashMap::new()),
            inbound_tx,
        }
    }

    /// Connect an output role to the first port matching `pattern`
    pub fn open_output(&self, device: DeviceKey, pattern: &str) -> anyhow::Result<()> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
        let (port, name) = find_port_by_substring(&midi_out, pattern)
            .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;

        let conn = midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Failed to connect to output port {}", name))?;

        info!("🎹 {} -> {}", device, name);
        self.outputs.lock().insert(device, conn);
        Ok(())
    }

    /// Connect an input role to the first port matching `pattern`
    pub fn open_input(&self, device: DeviceKey, pattern: &str) -> anyhow::Result<()> {
        let mut midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
        midi_in.ignore(midir::Ignore::All);
        let (port, name) = find_port_by_substring(&midi_in, pattern)
            .ok_or_else(|| anyhow!("Input port '{}' not found", pattern))?;

        let tx = self.inbound_tx.clone();
        let key = device.clone();
        let conn = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |_stamp, data, _| {
                    let inbound = InboundMidi {
                        device: key.clone(),
                        raw: data.to_vec(),
                        received_at: Instant::now(),
                    };
                    // Never block the driver callback
                    if tx.try_send(inbound).is_err() {
                        debug!("Inbound queue full, dropped {}", format_hex(data));
                    }
                },
                (),
            )
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Failed to connect to input port {}", name))?;

        info!("🎹 {} <- {}", device, name);
        self.inputs.lock().insert(device, conn);
        Ok(())
    }

    /// Drop every connection
    pub fn close_all(&self) {
        let outputs: Vec<_> = self.outputs.lock().drain().collect();
        for (_, conn) in outputs {
            conn.close();
        }
        let inputs: Vec<_> = self.inputs.lock().drain().collect();
        for (_, conn) in inputs {
            conn.close();
        }
        debug!("MIDI ports closed");
    }

    /// (Re)open every configured role plus one input per trigger device
    ///
    /// Ports that cannot be opened are logged and skipped. Returns how many
    /// connections are open afterwards.
    pub fn open_from_config(&self, midi: &MidiConfig, trigger_devices: &BTreeSet<String>) -> usize {
        self.close_all();

        let outputs = [
            (DeviceKey::RemoteOut, &midi.remote_out),
            (DeviceKey::SwitchNotifierOut, &midi.switch_notifier_out),
            (DeviceKey::SwitchItemOut, &midi.switch_item_out),
        ];
        for (device, pattern) in outputs {
            if let Some(pattern) = pattern.as_deref().filter(|p| !p.is_empty()) {
                if let Err(e) = self.open_output(device.clone(), pattern) {
                    warn!("⚠️  {}: {:#}", device, e);
                }
            }
        }

        let mut inputs = vec![
            (DeviceKey::SwitchCommandIn, midi.switch_command_in.clone()),
            (DeviceKey::RemoteIn, midi.remote_in.clone()),
        ];
        inputs.extend(
            trigger_devices
                .iter()
                .map(|d| (DeviceKey::AutomationTriggerIn(d.clone()), Some(d.clone()))),
        );
        for (device, pattern) in inputs {
            if let Some(pattern) = pattern.as_deref().filter(|p| !p.is_empty()) {
                if let Err(e) = self.open_input(device.clone(), pattern) {
                    warn!("⚠️  {}: {:#}", device, e);
                }
            }
        }

        self.outputs.lock().len() + self.inputs.lock().len()
    }
}

impl MidiTransport for MidirTransport {
    fn send(&self, device: &DeviceKey, signature: &str) -> Result<()> {
        let message = signature::decode(signature)?;
        let mut outputs = self.outputs.lock();
        let Some(conn) = outputs.get_mut(device) else {
            debug!("{} not connected, \"{}\" not sent", device, signature);
            return Ok(());
        };
        let data = message.encode();
        conn.send(&data)
            .map_err(|e| AutomatorError::Midi(format!("{}: {}", device, e)))?;
        debug!("Sent {} | {} on {}", format_hex(&data), signature, device);
        Ok(())
    }
}

/// Case-insensitive substring match of a port name
pub fn port_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// First port whose name contains `pattern`
pub fn find_port_by_substring<T: MidiIO>(io: &T, pattern: &str) -> Option<(T::Port, String)> {
    io.ports().into_iter().find_map(|port| {
        let name = io.port_name(&port).ok()?;
        if port_matches(&name, pattern) {
            debug!("Found port '{}' matching pattern '{}'", name, pattern);
            Some((port, name))
        } else {
            None
        }
    })
}

/// Names of all input and output ports
pub fn list_ports() -> anyhow::Result<(Vec<String>, Vec<String>)> {
    let midi_in = MidiInput::new(CLIENT_NAME).context("Failed to create MIDI input")?;
    let midi_out = MidiOutput::new(CLIENT_NAME).context("Failed to create MIDI output")?;
    let inputs = midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect();
    let outputs = midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();
    Ok((inputs, outputs))
}
