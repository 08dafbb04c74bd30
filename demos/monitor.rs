//! Live monitor for an IntelliCenter controller.
//!
//! Demonstrates:
//! - Building a client with custom options
//! - Connecting and reading the discovered objects
//! - Subscribing to circuit status changes
//! - Printing availability and attribute events until Ctrl+C
//!
//! Usage:
//!   cargo run --example monitor -- 192.168.1.50
//!   cargo run --example monitor -- 192.168.1.50:6681 --debug
//!   cargo run --example monitor -- 192.168.1.50 --toggle C0003

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use intellicenter_client::{Client, ClientEvent, ClientOptions, Result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    address: String,
    debug: bool,
    toggle: Option<String>,
}

impl Args {
    fn parse() -> Option<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let address = args.iter().find(|a| !a.starts_with("--"))?.clone();
        let toggle = args
            .iter()
            .position(|a| a == "--toggle")
            .and_then(|i| args.get(i + 1))
            .cloned();
        Some(Self {
            address,
            debug: args.iter().any(|a| a == "--debug"),
            toggle,
        })
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "intellicenter_client=debug"
    } else {
        "intellicenter_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let Some(args) = Args::parse() else {
        eprintln!("usage: monitor <host[:port]> [--debug] [--toggle <object>]");
        std::process::exit(2);
    };
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== IntelliCenter Monitor ===\n");

    let options = ClientOptions::default()
        .with_connect_timeout(Duration::from_secs(5))
        .with_debounce_window(Duration::from_secs(30));
    let (client, mut events) = Client::builder().options(options).build()?;

    client.connect(&args.address).await?;
    println!("[Connect] {} ({})", args.address, client.state());

    // ========================================================================
    // Discovered objects
    // ========================================================================

    let mut circuits = Vec::new();
    while circuits.is_empty() {
        match events.recv().await {
            Some(ClientEvent::AttributesChanged { .. }) => {
                circuits = client.objects_of_type("CIRCUIT");
            }
            Some(_) => {}
            None => return Ok(()),
        }
    }

    if let Some(info) = client.system_info() {
        println!(
            "[System] {} version {} ({})",
            info.property_name(),
            info.software_version(),
            if info.uses_metric() { "metric" } else { "english" }
        );
    }

    for circuit in &circuits {
        println!(
            "        {:<6} {:<20} {}",
            circuit.name(),
            circuit.display_name().unwrap_or("-"),
            circuit.get("STATUS").unwrap_or("?")
        );
    }

    let pairs: Vec<(String, &str)> = circuits
        .iter()
        .map(|c| (c.name().to_string(), "STATUS"))
        .collect();
    let added = client.subscribe(pairs).await?;
    println!("\n[Subscribe] {added} attributes");

    // ========================================================================
    // Optional toggle
    // ========================================================================

    if let Some(object) = &args.toggle {
        let on = client.get_object(object).is_some_and(|o| o.is_on());
        let target = if on { "OFF" } else { "ON" };
        client.request_changes(object, [("STATUS", target)]).await?;
        println!("[Toggle] {object} -> {target}");
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    println!("\nPress Ctrl+C to exit...\n");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::AvailabilityChanged(available)) => {
                    println!("[Availability] {available}");
                }
                Some(ClientEvent::AttributesChanged { object, attributes }) => {
                    let Some(snapshot) = client.get_object(&object) else { continue };
                    for attribute in attributes {
                        println!(
                            "[Change] {object}.{attribute} = {}",
                            snapshot.get(&attribute).unwrap_or("")
                        );
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect().await?;
    client.shutdown();
    println!("\n=== Done ===");
    Ok(())
}
