//! Process runtime: CLI, logging, Zenoh session and the poll loop.

use argh::FromArgs;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};

use crate::client::{AerisClient, WeatherFetcher};
use crate::config::{load_config_or_default, NodeConfig};
use crate::controller::{AerisController, Command, CONTROLLER_ADDRESS};
use crate::drivers::DriverValue;
use crate::error::{AerisError, Result};
use crate::registry::MemoryRegistry;

/// Standard CLI arguments.
#[derive(FromArgs, Debug)]
#[argh(description = "AERIS weather node")]
pub struct NodeArgs {
    /// path to YAML configuration file
    #[argh(option, short = 'c', default = "String::from(\"config.yaml\")")]
    pub config: String,

    /// zenoh endpoint to connect to
    #[argh(option, short = 'e', default = "String::from(\"tcp/127.0.0.1:7447\")")]
    pub endpoint: String,
}

/// Initialize logging with env_logger.
///
/// Respects RUST_LOG environment variable. Defaults to "info" level.
pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

// ── Topics ──────────────────────────────────────────────────────────

/// Key expressions under `bubbaloop/{scope}/{machine_id}/{node}`.
#[derive(Debug, Clone)]
pub struct Topics {
    scope: String,
    machine_id: String,
    node: String,
}

impl Topics {
    pub fn new(scope: &str, machine_id: &str, node: &str) -> Self {
        Self {
            scope: scope.to_string(),
            machine_id: machine_id.to_string(),
            node: node.to_string(),
        }
    }

    /// Resolve scope and machine id from the environment.
    pub fn from_env(node: &str) -> Self {
        let scope = std::env::var("BUBBALOOP_SCOPE").unwrap_or_else(|_| "local".to_string());
        let machine_id = std::env::var("BUBBALOOP_MACHINE_ID")
            .unwrap_or_else(|_| {
                hostname::get()
                    .map(|h| h.to_string_lossy().to_string())
                    .unwrap_or_else(|_| "unknown".to_string())
            })
            .replace('-', "_");
        Self::new(&scope, &machine_id, node)
    }

    pub fn prefix(&self) -> String {
        format!("bubbaloop/{}/{}/{}", self.scope, self.machine_id, self.node)
    }

    pub fn config(&self) -> String {
        format!("{}/config", self.prefix())
    }

    pub fn command(&self) -> String {
        format!("{}/command", self.prefix())
    }

    pub fn notices(&self) -> String {
        format!("{}/notices", self.prefix())
    }

    pub fn health(&self) -> String {
        format!(
            "bubbaloop/{}/{}/health/{}",
            self.scope, self.machine_id, self.node
        )
    }

    pub fn driver(&self, address: &str, driver: &str) -> String {
        format!("{}/{}/{}", self.prefix(), address, driver)
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Open a Zenoh session in client mode. `ZENOH_ENDPOINT` overrides `endpoint`.
pub async fn open_session(endpoint: &str) -> Result<Arc<zenoh::Session>> {
    let endpoint = std::env::var("ZENOH_ENDPOINT").unwrap_or_else(|_| endpoint.to_string());
    log::info!("Connecting to Zenoh at: {}", endpoint);

    let mut config = zenoh::Config::default();
    config
        .insert_json5("mode", r#""client""#)
        .map_err(|e| AerisError::Zenoh(format!("Failed to set Zenoh mode: {}", e)))?;
    config
        .insert_json5("connect/endpoints", &format!(r#"["{}"]"#, endpoint))
        .map_err(|e| AerisError::Zenoh(format!("Failed to set Zenoh endpoint: {}", e)))?;

    let session = zenoh::open(config).await?;
    log::info!("Connected to Zenoh");
    Ok(Arc::new(session))
}

fn spawn_health_heartbeat(
    session: Arc<zenoh::Session>,
    topic: String,
    mut shutdown_rx: watch::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    log::info!("Health heartbeat: {}", topic);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::debug!("Health heartbeat stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = session.put(topic.as_str(), "ok").await {
                        log::warn!("Health heartbeat failed: {}", e);
                    }
                }
            }
        }
    })
}

// ── Publishing ──────────────────────────────────────────────────────

/// Drain pending driver changes of the controller and every entity.
pub fn collect_changes<F: WeatherFetcher>(
    controller: &mut AerisController<F, MemoryRegistry>,
) -> Vec<(String, String, DriverValue)> {
    let mut changes: Vec<(String, String, DriverValue)> = controller
        .drivers_mut()
        .take_changes()
        .into_iter()
        .map(|(driver, value)| (CONTROLLER_ADDRESS.to_string(), driver, value))
        .collect();
    for (address, entity) in controller.registry_mut().iter_mut() {
        changes.extend(
            entity
                .drivers
                .take_changes()
                .into_iter()
                .map(|(driver, value)| (address.clone(), driver, value)),
        );
    }
    changes
}

struct Publisher {
    session: Arc<zenoh::Session>,
    topics: Topics,
    last_notices: Option<Vec<String>>,
}

impl Publisher {
    async fn flush<F: WeatherFetcher>(&mut self, controller: &mut AerisController<F, MemoryRegistry>) {
        for (address, driver, value) in collect_changes(controller) {
            let key = self.topics.driver(&address, &driver);
            let payload = json!({"value": value.value, "uom": value.uom}).to_string();
            if let Err(e) = self.session.put(key.as_str(), payload).await {
                log::warn!("Failed to publish {}: {}", key, e);
            }
        }

        let notices = controller.notices();
        if self.last_notices.as_deref() != Some(notices) {
            let payload = json!(notices).to_string();
            if let Err(e) = self.session.put(self.topics.notices(), payload).await {
                log::warn!("Failed to publish notices: {}", e);
            }
            self.last_notices = Some(notices.to_vec());
        }
    }
}

fn parse_parameters(bytes: &[u8]) -> Result<BTreeMap<String, Value>> {
    serde_json::from_slice(bytes).map_err(|e| AerisError::Parse(format!("parameter update: {}", e)))
}

// ── Main loop ───────────────────────────────────────────────────────

/// Run the controller until the shutdown signal fires.
pub async fn run<F: WeatherFetcher>(
    mut controller: AerisController<F, MemoryRegistry>,
    session: Arc<zenoh::Session>,
    topics: Topics,
    config: &NodeConfig,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<()> {
    let heartbeat = spawn_health_heartbeat(session.clone(), topics.health(), shutdown_rx.clone());

    let config_sub = session.declare_subscriber(topics.config()).await?;
    let command_sub = session.declare_subscriber(topics.command()).await?;
    log::info!("Listening for parameters on {}", topics.config());

    let mut publisher = Publisher {
        session: session.clone(),
        topics: topics.clone(),
        last_notices: None,
    };

    controller.start().await;
    publisher.flush(&mut controller).await;

    // start() already ran the first queries
    let mut short_poll = interval_at(Instant::now() + config.short_poll(), config.short_poll());
    let mut long_poll = interval_at(Instant::now() + config.long_poll(), config.long_poll());

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                log::info!("Shutting down poll loop");
                break;
            }
            _ = long_poll.tick() => {
                controller.poll(true).await;
            }
            _ = short_poll.tick() => {
                controller.poll(false).await;
            }
            sample = config_sub.recv_async() => match sample {
                Ok(sample) => match parse_parameters(&sample.payload().to_bytes()) {
                    Ok(incoming) => controller.on_parameters(&incoming),
                    Err(e) => log::warn!("{}", e),
                },
                Err(e) => {
                    log::warn!("Parameter subscriber error: {}", e);
                    break;
                }
            },
            sample = command_sub.recv_async() => match sample {
                Ok(sample) => {
                    let text = String::from_utf8_lossy(&sample.payload().to_bytes()).to_string();
                    match text.parse::<Command>() {
                        Ok(command) => controller.handle_command(command),
                        Err(e) => log::warn!("{}", e),
                    }
                }
                Err(e) => {
                    log::warn!("Command subscriber error: {}", e);
                    break;
                }
            },
        }
        publisher.flush(&mut controller).await;
    }

    if let Err(e) = heartbeat.await {
        log::warn!("Health heartbeat task failed: {}", e);
    }
    Ok(())
}

/// Entry point used by the binary.
pub async fn run_node() -> std::result::Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let args: NodeArgs = argh::from_env();
    log::info!("Starting aeris-node v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Loading config from: {}", args.config);

    let config: NodeConfig = load_config_or_default(&args.config)?;
    let topics = Topics::from_env(&config.node_name);
    log::info!("Publishing under {}", topics.prefix());

    let session = open_session(&args.endpoint).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    })?;

    let client = AerisClient::new(config.base_url.clone(), config.request_timeout())?;
    let controller = AerisController::new(
        config.params(),
        client,
        MemoryRegistry::new(),
        config.forecast_interval,
    );

    log::info!("Node running. Press Ctrl+C to stop.");
    run(controller, session, topics, &config, shutdown_rx).await?;

    log::info!("Node stopped");
    Ok(())
}
