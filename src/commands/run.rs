//! `netmeter run`: live speed and usage until Ctrl+C.

use std::io::{self, BufRead};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use anyhow::Result;
use colored::Colorize;

use crate::core::telemetry::{EngineDeps, PowerState, TelemetryEngine, TelemetryRuntime};
use crate::platform::{SysinfoNetworkSource, UnavailableUsageSource};
use crate::ui::ConsolePresenter;

enum Control {
    Stop,
    Power(PowerState),
}

/// Map a line typed on stdin to a control message.
fn parse_control(line: &str) -> Option<Control> {
    match line.trim().to_lowercase().as_str() {
        "off" => Some(Control::Power(PowerState::ScreenOff)),
        "on" => Some(Control::Power(PowerState::ScreenOn)),
        "q" | "quit" => Some(Control::Stop),
        _ => None,
    }
}

pub fn execute(matches: &clap::ArgMatches) -> Result<()> {
    let store = super::open_store(matches)?;
    let screen_off = matches.get_flag("screen-off");
    let deadline = matches
        .get_one::<u64>("duration")
        .map(|secs| Instant::now() + Duration::from_secs(*secs));

    let network = Arc::new(SysinfoNetworkSource::new());
    let engine = Arc::new(TelemetryEngine::new(EngineDeps {
        counters: network.clone(),
        probe: network,
        usage_source: Arc::new(UnavailableUsageSource),
        store,
        presenter: Arc::new(ConsolePresenter::new()),
    }));

    let initial = if screen_off {
        PowerState::ScreenOff
    } else {
        PowerState::ScreenOn
    };
    let runtime = TelemetryRuntime::start(engine, initial)?;

    let (control_tx, control_rx) = mpsc::channel::<Control>();

    let ctrlc_tx = control_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Control::Stop);
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    // Blocks on stdin for the life of the process; never joined.
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if let Some(control) = parse_control(&line) {
                if control_tx.send(control).is_err() {
                    break;
                }
            }
        }
    });

    println!("{}", "Monitoring network traffic...".cyan().bold());
    println!(
        "{}",
        "Type 'off'/'on' to simulate the screen turning off/on, Ctrl+C to stop".dimmed()
    );
    println!();

    loop {
        let control = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                control_rx.recv_timeout(left).unwrap_or(Control::Stop)
            }
            None => control_rx.recv().unwrap_or(Control::Stop),
        };

        match control {
            Control::Stop => break,
            Control::Power(state) => runtime.set_power_state(state),
        }
    }

    println!();
    println!("{}", "Stopping...".yellow());
    runtime.shutdown();
    Ok(())
}
