//! Wallpad bus example
//!
//! Runs a light and a thermostat on a serial adapter, or on a TCP gateway
//! when `RS485_GATEWAY=host:port` is set, and records every unknown frame.

use std::time::Duration;

use anyhow::Context;
use rs485::{
    Bus, BusConfig, BusEvent, BytePattern, Checksum, Command, CommandInput, CommandTemplate,
    DeviceCommand, DeviceDescriptor, DirectionControl, Driver, NumericSpec,
    SerialDriver, StateValue, TcpDriver,
};
use tracing_subscriber::EnvFilter;

fn open_driver(config: &BusConfig) -> anyhow::Result<Box<dyn Driver>> {
    if let Ok(gateway) = std::env::var("RS485_GATEWAY") {
        let (host, port) = gateway
            .rsplit_once(':')
            .context("RS485_GATEWAY must be host:port")?;
        let mut driver = TcpDriver::new(host, port.parse()?);
        driver.connect()?;
        return Ok(Box::new(driver));
    }

    let port = std::env::var("RS485_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let driver = SerialDriver::open(&port, &config.serial)
        .with_context(|| format!("opening {}", port))?
        .with_direction_control(DirectionControl::Rts, false);
    Ok(Box::new(driver))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rs485=info".parse()?))
        .init();

    let config = BusConfig::new(9600)
        .with_prefix(vec![0xF7])
        .with_suffix(vec![0xEE])
        .with_checksum(Checksum::Xor)
        .with_rx_wait(Duration::from_millis(50))
        .with_tx_interval(Duration::from_millis(20))
        .with_ctrl_pin(true)
        .with_packet_monitor([]);

    let driver = open_driver(&config)?;
    let mut bus = Bus::new(config, driver)?;

    let light = bus.register(
        DeviceDescriptor::new("living room light", BytePattern::new(1, vec![0x0E, 0x11]))
            .with_state_on(BytePattern::new(4, vec![0x01]).with_and_operator(true))
            .with_state_off(
                BytePattern::new(4, vec![0x01])
                    .with_and_operator(true)
                    .with_inverted(true),
            )
            .with_command_on(Command::new(vec![0x0E, 0x11, 0x41, 0x01]).with_ack(vec![0x0E, 0x11, 0xC1]))
            .with_command_off(Command::new(vec![0x0E, 0x11, 0x41, 0x00]).with_ack(vec![0x0E, 0x11, 0xC1]))
            .with_command_state(Command::new(vec![0x0E, 0x11, 0x01, 0x00]))
            .with_update_interval(Duration::from_secs(30)),
    )?;

    let thermostat = bus.register(
        DeviceDescriptor::new("thermostat", BytePattern::new(1, vec![0x36, 0x11]))
            .with_state_on(BytePattern::new(4, vec![0x01]))
            .with_state_off(BytePattern::new(4, vec![0x00]))
            .with_numeric("target", NumericSpec::new(5, 1, 0)?)
            .with_numeric("current", NumericSpec::new(6, 1, 0)?)
            .with_command(
                "temperature",
                CommandTemplate::dynamic(|input: &CommandInput| {
                    let target = input.value.unwrap_or(22.0).clamp(5.0, 40.0) as u8;
                    Command::new(vec![0x36, 0x11, 0x44, target]).with_ack(vec![0x36, 0x11, 0xC4])
                }),
            ),
    )?;

    for device in [light, thermostat] {
        bus.register_listener(device, |name: &str, value: &StateValue| {
            println!("{:>20}: {}", name, value);
        })?;
    }

    let (handle, task) = bus.start();
    let mut events = handle.subscribe();

    handle.command(light, DeviceCommand::On).await?;
    handle
        .command(
            thermostat,
            DeviceCommand::named_with("temperature", CommandInput::value(23.0)),
        )
        .await?;

    let monitor = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BusEvent::Monitor(record) => println!("monitor {}", record),
                BusEvent::WriteFailed { id, attempts } => {
                    eprintln!("write {} failed after {} attempts", id, attempts)
                }
                _ => {}
            }
        }
    });

    tokio::signal::ctrl_c().await?;

    let stats = handle.stats().await?;
    println!("{:#?}", stats);

    handle.shutdown().await?;
    task.await?;
    monitor.abort();

    Ok(())
}
