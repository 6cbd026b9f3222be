use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fastpair_core::{
    config::PairerConfig,
    harness::{TestBed, BLE_ADDRESS, CLASSIC_ADDRESS},
    types::{DeviceFastPairVersion, Protocol},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage:");
        eprintln!("  fastpair-demo initial       pair a new device by address and write an account key");
        eprintln!("  fastpair-demo subsequent    pair a device that already carries the account key");
        eprintln!("  fastpair-demo retroactive   write an account key to an already bonded device");
        eprintln!("  fastpair-demo v1            hand a V1 device to the system pairing dialog");
        eprintln!("  fastpair-demo timeout       bonding never settles");
        eprintln!();
        eprintln!("Configuration: FASTPAIR_CONFIG=<file.toml>, FASTPAIR_BOND_TIMEOUT_SECS, ...");
        std::process::exit(2);
    }

    let config = PairerConfig::load().context("loading pairer configuration")?;
    info!(?config, "configuration loaded");

    let bed = TestBed::new();
    let scenario = args[1].as_str();
    let mut system_dialog_device = None;
    let device = match scenario {
        "initial" => {
            bed.connectable_classic_device();
            bed.device(Protocol::Initial)
        }
        "subsequent" => {
            bed.known_classic_device();
            bed.device(Protocol::Subsequent)
        }
        "retroactive" => {
            bed.known_classic_device().set_bonded(true);
            bed.device(Protocol::Retroactive)
        }
        "v1" => {
            system_dialog_device = Some(bed.known_classic_device());
            let device = bed.device(Protocol::Initial);
            device.set_version(Some(DeviceFastPairVersion::V1));
            device
        }
        "timeout" => {
            bed.known_classic_device().hang_pairing();
            bed.device(Protocol::Initial)
        }
        other => bail!("unknown scenario: {other}"),
    };

    info!(scenario, ble = BLE_ADDRESS, classic = CLASSIC_ADDRESS, "starting pairer");
    let pairer = bed.start(device.clone(), config);

    // Stand in for the user accepting the system dialog.
    if let Some(classic) = system_dialog_device {
        pairer
            .device_paired_changed(&*classic, true)
            .context("forwarding paired notification")?;
    }

    let state = pairer.wait_for_completion().await;
    info!(?state, "pairer finished");

    println!("callbacks:");
    for event in bed.recorder.events() {
        println!("  {event:?}");
    }
    println!("metrics:");
    for metric in bed.metrics.events() {
        println!("  {}", metric.name());
    }
    match device.account_key() {
        Some(key) => println!("account key: {}", key.to_hex()),
        None => warn!("no account key written"),
    }

    Ok(())
}
