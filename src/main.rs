use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use tokio::{
    net::TcpListener,
    signal,
    time::{self, MissedTickBehavior},
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use calcifer::{
    alerts::Dispatcher,
    api::{self, AppState},
    app::App,
    config::Config,
    display::{
        panel::{FbPanel, NullPanel},
        Display, Panel, Screen,
    },
    forwarder::{
        adafruit::{AdafruitClient, AdafruitSink},
        mqtt::{read_mac, MqttSink},
        Forwarder, Sink,
    },
    outdoor::{IqAirClient, OutdoorMonitor},
    persistence::{self, settings::Settings, Persistence},
    sensors::SensorReader,
    singleton,
    telegram::{commands::CommandHandler, commands::CommandService, TelegramClient},
};

const TICK: Duration = Duration::from_secs(1);
/// How long the MQTT event loop gets to flush `offline` before exit.
const MQTT_DRAIN: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    singleton::ensure_single_instance(&config.process_name)?;

    let now = Utc::now();
    let settings = match Settings::load(&config.config_path).await {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "Config document unusable, starting without integrations or baseline");
            Settings::default()
        }
    };

    // Sensors and the restored calibration
    let mut sensors = SensorReader::open(&config.i2c_bus, config.enable_bme280)
        .with_context(|| format!("failed to open sensors on {}", config.i2c_bus))?;
    let restored = persistence::restore_baseline(&mut sensors, &settings, now, config.language);

    // Screen
    let panel: Box<dyn Panel> = match &config.display_fb {
        Some(fb) => match FbPanel::open(fb, config.display_backlight.clone()) {
            Ok(panel) => Box::new(panel),
            Err(e) => {
                warn!(fb = %fb.display(), error = %e, "Display unavailable, running headless");
                Box::new(NullPanel)
            }
        },
        None => {
            info!("No display configured, running headless");
            Box::new(NullPanel)
        }
    };
    let mut display = Display::new(
        panel,
        Screen::new(config.proximity_threshold, config.screen_timeout_secs),
    );
    if let Err(e) = display.splash() {
        let chain = format!("{e:#}");
        warn!(error = %chain, "Boot frame not shown");
    }

    // Outdoor conditions
    let iqair = match (&settings.iqair, settings.location) {
        (Some(iqair), Some(location)) => Some(IqAirClient::new(&config.iqair_base_url, iqair, location)?),
        _ => None,
    };
    let outdoor = OutdoorMonitor::new(iqair, now, secs(config.outdoor_refresh_secs)?);

    // Telemetry sinks
    let mut sinks = Vec::new();
    if let Some(adafruit) = &settings.adafruit {
        let client = AdafruitClient::new(&config.adafruit_base_url, adafruit)?;
        sinks.push(Sink::Adafruit(AdafruitSink::new(client)));
    }
    let mut mqtt_loop = None;
    if let Some(mqtt) = &settings.mqtt {
        match read_mac(Path::new("/sys"), &config.net_interface) {
            Ok(mac) => {
                let (sink, handle) = MqttSink::connect(mqtt, mac);
                sinks.push(Sink::Mqtt(sink));
                mqtt_loop = Some(handle);
            }
            Err(e) => {
                let chain = format!("{e:#}");
                warn!(interface = %config.net_interface, error = %chain, "MQTT disabled");
            }
        }
    }
    let forwarder = Forwarder::new(
        sinks,
        now,
        secs(config.forward_warmup_secs)?,
        secs(config.forward_interval_secs)?,
    );

    let telegram = settings.telegram.clone();
    let persistence = Persistence::new(
        settings,
        config.config_path.clone(),
        config.log_dir.clone(),
        restored,
        now,
    );

    let mut app: App<TelegramClient, Sink> = App::new(
        Box::new(sensors),
        display,
        persistence,
        Dispatcher::new(config.good_alert_ticks, config.bad_alert_ticks),
        forwarder,
        outdoor,
    );

    // Chat commands share the cache and subscriber set with the tick loop
    match telegram {
        Some(telegram) => {
            let client = TelegramClient::new(&config.telegram_base_url, &telegram.token)?;
            let handler = CommandHandler::new(
                telegram.authorized_user_ids.iter().copied(),
                app.subscribers(),
                app.cache(),
                config.language,
            );
            tokio::spawn(CommandService::new(client.clone(), handler).run());
            app = app.with_notifier(client, config.language);
        }
        None => info!("Telegram not configured, chat commands and alerts disabled"),
    }

    if config.api_enabled {
        let addr = format!("{}:{}", config.server_host, config.server_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind status API on {addr}"))?;
        info!(addr = %addr, "Status API listening");

        let router = api::router(AppState {
            cache: app.cache(),
            subscribers: app.subscribers(),
        });
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "Status API stopped");
            }
        });
    }

    let mut ticker = time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    info!(tick_ms = TICK.as_millis() as u64, "Tick loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => app.tick(Utc::now()).await,
            _ = &mut shutdown => break,
        }
    }

    app.shutdown().await;
    if let Some(handle) = mqtt_loop {
        if time::timeout(MQTT_DRAIN, handle).await.is_err() {
            warn!("MQTT event loop did not stop in time");
        }
    }
    info!("Bye");
    Ok(())
}

fn secs(n: u64) -> Result<TimeDelta> {
    TimeDelta::from_std(Duration::from_secs(n)).with_context(|| format!("{n} seconds is out of range"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
