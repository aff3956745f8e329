use log::{error, info, warn};
use tokio::signal;
use tokio::spawn;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::battery::BatterySource;
use crate::battery::FixedBattery;
use crate::battery::sysfs::SysfsBattery;
use crate::cli::types::{Args, CliCommand};
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::adapter::BleAdapter;
use crate::device::btle::BtleAdapter;
use crate::device::controller::{spawn_controller, ControllerHandle};
use crate::device::types::{ConnectionState, LedRoutine, LED_ROUTINES};
use crate::error::{AppRunError, LinkError};

fn print_routines() {
    for routine in LED_ROUTINES {
        println!("{}: {}", routine.index(), routine.name());
    }
}

async fn load_config(config_io: &ConfigIO) -> Config {
    match config_io.read().await {
        Ok(config) => config,
        Err(err) => {
            if err.is_file_not_found_error() {
                info!("Config file not found, using defaults");
            } else {
                error!("Failed to load config, using defaults: {}", err);
            }
            Config::default()
        },
    }
}

/// Waits until a connect attempt settles: `Ok` once ready, the reported error once idle again.
async fn wait_for_connection(controller: &ControllerHandle) -> Result<(), LinkError> {
    let mut status = controller.subscribe();
    let status = status
        .wait_for(|status| matches!(status.state, ConnectionState::Ready | ConnectionState::Idle))
        .await
        .map_err(|_| LinkError::ControllerStopped)?
        .clone();

    match status.state {
        ConnectionState::Ready => Ok(()),
        _ => Err(status.last_error.unwrap_or(LinkError::NotConnected)),
    }
}

async fn wait_for_idle(controller: &ControllerHandle) -> Result<(), LinkError> {
    let mut status = controller.subscribe();
    status
        .wait_for(|status| status.state == ConnectionState::Idle)
        .await
        .map_err(|_| LinkError::ControllerStopped)?;
    Ok(())
}

async fn keep_connected(controller: &ControllerHandle, routine: Option<LedRoutine>, reconnect_delay: Option<Duration>) -> Result<(), LinkError> {
    loop {
        controller.connect().await?;

        let error = match wait_for_connection(controller).await {
            Ok(()) => {
                if let Some(routine) = routine {
                    if let Err(err) = controller.send_command(routine).await {
                        warn!("Failed to switch LED routine to {}: {}", routine, err);
                    }
                }

                wait_for_idle(controller).await?;
                controller.status().last_error.unwrap_or(LinkError::UnexpectedDisconnect)
            },
            Err(err) => err,
        };

        match reconnect_delay {
            None => return Err(error),
            Some(delay) => {
                warn!("{}; reconnecting in {}", error, humantime::format_duration(delay));
                sleep(delay).await;
            },
        }
    }
}

async fn switch_routine(controller: &ControllerHandle, routine: LedRoutine) -> Result<(), LinkError> {
    controller.connect().await?;
    wait_for_connection(controller).await?;

    let result = controller.send_command(routine).await;
    if result.is_ok() {
        info!("Switched LED routine to {}", routine);
    }

    controller.disconnect().await?;
    result
}

async fn drive<A: BleAdapter, B: BatterySource>(
    command: CliCommand,
    adapter: A,
    battery: B,
    config: &Config,
    cancel: CancellationToken,
) -> Result<(), LinkError> {
    let (controller, handle) = spawn_controller(adapter, battery, config.controller_settings(), cancel.clone());

    let work = async {
        match command {
            CliCommand::Run { routine, no_reconnect } => {
                let reconnect_delay = if no_reconnect { None } else { Some(config.reconnect_delay()) };
                keep_connected(&controller, routine, reconnect_delay).await
            },
            CliCommand::Led { routine } => switch_routine(&controller, routine).await,
            CliCommand::Routines => Ok(()),
        }
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = work => result,
    };

    // stops the controller, which disconnects gracefully if still connected
    cancel.cancel();
    if let Err(err) = handle.await {
        error!("Connection controller task failed: {}", err);
    }

    result
}

async fn run_async(args: Args, command: CliCommand) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(args.config.clone())?;
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;
    let config = load_config(&config_io).await;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupted, disconnecting");
            ctrl_c_cancel.cancel();
        }
    });

    let adapter = BtleAdapter::new().await?;

    let result = match args.level {
        Some(level) => drive(command, adapter, FixedBattery::new(level), &config, cancel).await,
        None => {
            let battery = SysfsBattery::new(config.battery_path.clone(), config.battery_poll_delay());
            // fail early on hosts without a readable power supply
            battery.reading().await?;
            drive(command, adapter, battery, &config, cancel).await
        },
    };

    Ok(result?)
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let command = args.command.clone().unwrap_or_default();
    if let CliCommand::Routines = command {
        print_routines();
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| AppRunError::Runtime { source })?;

    runtime.block_on(run_async(args, command))
}
