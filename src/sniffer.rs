//! Port listing and signature learning
//!
//! `--learn` prints the signature of every incoming channel message so it
//! can be pasted into the config or a playlist entry.

use anyhow::{anyhow, Context, Result};
use colored::*;
use midir::{MidiInput, MidiInputConnection};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::info;

use crate::midi::{format_hex, MidiMessage};
use crate::signature;
use crate::transport::{self, port_matches};

/// Message seen while learning
#[derive(Debug, Clone)]
pub struct SnifferEvent {
    pub timestamp_ms: u64,
    pub port_name: String,
    pub data: Vec<u8>,
    pub message: Option<MidiMessage>,
}

impl SnifferEvent {
    /// Signature of the message, `None` for system messages
    pub fn signature(&self) -> Option<String> {
        self.message.as_ref().map(signature::encode)
    }
}

/// Print signatures of incoming messages until Ctrl+C
///
/// Listens on every input port whose name contains `pattern`, or on all
/// input ports without a pattern.
pub async fn run_learn(pattern: Option<String>) -> Result<()> {
    println!("{}", "=== MIDI Learn ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let mut sniffer = Sniffer::new();
    sniffer.connect(pattern.as_deref())?;

    println!(
        "{}",
        "Format: [timestamp] PORT | HEX => SIGNATURE".dimmed()
    );
    println!("{}\n", "─".repeat(80).dimmed());

    sniffer.run().await
}

struct Sniffer {
    connections: Vec<MidiInputConnection<()>>,
    event_rx: mpsc::Receiver<SnifferEvent>,
    event_tx: mpsc::Sender<SnifferEvent>,
    start_time: Instant,
}

impl Sniffer {
    fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);
        Self {
            connections: Vec::new(),
            event_rx,
            event_tx,
            start_time: Instant::now(),
        }
    }

    fn connect(&mut self, pattern: Option<&str>) -> Result<()> {
        let (inputs, _) = transport::list_ports()?;
        for (index, name) in inputs.iter().enumerate() {
            if pattern.is_some_and(|p| !port_matches(name, p)) {
                continue;
            }
            let midi_in = MidiInput::new(&format!("MIDI-Automator-Learn-{}", index))
                .context("Failed to create MIDI input")?;
            // Port order is stable between two enumerations of the same client
            if let Some(port) = midi_in.ports().into_iter().nth(index) {
                self.connect_port(midi_in, port, name)?;
            }
        }

        if self.connections.is_empty() {
            match pattern {
                Some(p) => anyhow::bail!("No input port found matching pattern: {}", p),
                None => anyhow::bail!("No MIDI input ports found"),
            }
        }
        Ok(())
    }

    fn connect_port(
        &mut self,
        midi_in: MidiInput,
        port: midir::MidiInputPort,
        port_name: &str,
    ) -> Result<()> {
        let event_tx = self.event_tx.clone();
        let port_name = port_name.to_string();
        let start_time = self.start_time;

        info!("Listening on: {}", port_name);

        let conn = midi_in
            .connect(
                &port,
                "MIDI-Automator-Learn",
                move |_timestamp, data, _| {
                    let event = SnifferEvent {
                        timestamp_ms: start_time.elapsed().as_millis() as u64,
                        port_name: port_name.clone(),
                        data: data.to_vec(),
                        message: MidiMessage::parse(data),
                    };
                    let _ = event_tx.try_send(event);
                },
                (),
            )
            .map_err(|e| anyhow!("{}", e))?;

        self.connections.push(conn);
        Ok(())
    }

    async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => print_event(&event),
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        println!("\n{}", "Learn stopped".yellow());
        Ok(())
    }
}

fn print_event(event: &SnifferEvent) {
    let port = if event.port_name.chars().count() > 20 {
        format!("{}...", event.port_name.chars().take(17).collect::<String>())
    } else {
        event.port_name.clone()
    };

    let hex = format_hex(&event.data);
    let hex_colored = match event.message {
        Some(MidiMessage::NoteOn { .. }) => hex.bright_green(),
        Some(MidiMessage::NoteOff { .. }) => hex.bright_red(),
        Some(MidiMessage::ControlChange { .. }) => hex.bright_yellow(),
        Some(MidiMessage::PitchBend { .. }) => hex.bright_cyan(),
        Some(_) => hex.normal(),
        None => hex.bright_black(),
    };
    let parsed = event
        .signature()
        .map(|sig| format!(" => {}", sig.bright_blue()))
        .unwrap_or_default();

    println!(
        "[{}ms] {:20} | {}{}",
        format!("{:08}", event.timestamp_ms).dimmed(),
        port.white(),
        hex_colored,
        parsed
    );
}

/// List all ports in a formatted way
pub fn list_ports_formatted() -> Result<()> {
    let (inputs, outputs) = transport::list_ports()?;

    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());
    for (title, ports) in [("Input Ports:", inputs), ("Output Ports:", outputs)] {
        println!("\n{}", title.bold());
        if ports.is_empty() {
            println!("  {}", "No ports found".dimmed());
        }
        for (index, name) in ports.iter().enumerate() {
            println!("  {} {}", format!("[{}]", index).green(), name);
        }
    }
    println!(
        "\n{}",
        "Config port names match by case-insensitive substring.".dimmed()
    );
    println!();
    Ok(())
}
