// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::context::DeviceContext;
use crate::discovery::{Backend, Selection, Target};
use crate::dock::DockFilter;
use crate::dpcd::aux::AuxChannel;
use crate::dsc::{DecodePolicy, DscMachine, WritePolicy};
use crate::hotplug::{DockWatcher, InstanceLock, Trigger};

#[macro_use]
extern crate tracing;

mod config;
mod connector;
mod context;
mod discovery;
mod dock;
mod dpcd;
mod dsc;
mod error;
mod firmware;
mod hotplug;
mod pass;
mod permissions;

/// Enable Display Stream Compression on panels, automatically when a dock attaches
#[derive(Parser, Debug)]
#[command(name = "dock-dsc", version)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/dock-dsc/config.kdl, then /etc)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover connected panels once and enable DSC where it is off
    Apply {
        /// external | internal
        #[arg(long, default_value = "external")]
        target: Target,
        /// Restrict to these connectors, treating them as connected (repeatable)
        #[arg(long = "connector", value_name = "NAME")]
        connectors: Vec<String>,
        /// sysfs | udev
        #[arg(long, default_value = "sysfs")]
        backend: Backend,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Watch for the dock and enable DSC on external monitors after it attaches
    Watch {
        /// Seconds to wait after the dock attaches
        #[arg(long, value_name = "SECS")]
        settle_secs: Option<u64>,
        /// Required dock identity keyword (repeatable, replaces configured set)
        #[arg(long = "keyword", value_name = "WORD")]
        keywords: Vec<String>,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Show connectors, firmware, current DSC values and permissions without writing
    Status {
        /// external | internal
        #[arg(long, default_value = "external")]
        target: Target,
        /// sysfs | udev
        #[arg(long, default_value = "sysfs")]
        backend: Backend,
    },
}

#[derive(Args, Debug)]
struct PolicyArgs {
    /// exact | bit0
    #[arg(long)]
    decode: Option<DecodePolicy>,
    /// conservative | daisy-chain | aggressive
    #[arg(long)]
    write: Option<WritePolicy>,
}

impl PolicyArgs {
    fn apply_to(&self, config: &mut Config) {
        if let Some(decode) = self.decode {
            config.decode = decode;
        }
        if let Some(write) = self.write {
            config.write = write;
        }
    }
}

fn setup_logs() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "warn,{}=info",
        env!("CARGO_CRATE_NAME")
    )));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}

fn selection_for(target: Target) -> Selection {
    match target {
        Target::External => Selection::external(),
        Target::Internal => Selection::internal(),
    }
}

fn machine_for(config: &Config) -> DscMachine {
    if config.write == WritePolicy::Aggressive {
        warn!("Aggressive write policy active: DSC will be forced on every run");
    }
    DscMachine::new(config.decode, config.write)
}

fn main() -> anyhow::Result<()> {
    setup_logs();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Apply {
            target,
            connectors,
            backend,
            policy,
        } => {
            policy.apply_to(&mut config);
            let ctx = DeviceContext::from_config(&config);
            let mut selection = selection_for(target);
            if !connectors.is_empty() {
                selection = selection.with_allow_list(connectors);
            }
            apply(&ctx, &selection, backend, machine_for(&config))
        }
        Command::Watch {
            settle_secs,
            keywords,
            policy,
        } => {
            policy.apply_to(&mut config);
            if let Some(secs) = settle_secs {
                config.settle_delay = std::time::Duration::from_secs(secs);
            }
            if !keywords.is_empty() {
                config.dock_keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
            }
            let ctx = DeviceContext::from_config(&config);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(watch(ctx, config))
        }
        Command::Status { target, backend } => {
            let ctx = DeviceContext::from_config(&config);
            status(&ctx, target, backend, &config)
        }
    }
}

fn apply(
    ctx: &DeviceContext,
    selection: &Selection,
    backend: Backend,
    machine: DscMachine,
) -> anyhow::Result<()> {
    firmware::log_dmcub_versions(ctx);
    let report = pass::run(ctx, selection, backend, machine)?;
    if !report.failed.is_empty() {
        warn!("{} device(s) could not be updated", report.failed.len());
    }
    Ok(())
}

async fn watch(ctx: DeviceContext, config: Config) -> anyhow::Result<()> {
    let preflight = permissions::check_aux_permissions(&ctx);
    if preflight.has_issues() {
        warn!("Permission preflight: {}", preflight.summary());
    } else {
        info!("Permission preflight: {}", preflight.summary());
    }

    let lock = InstanceLock::acquire(&hotplug::default_lock_dir())?;
    debug!("Holding watcher lock {}", lock.path().display());

    let (tx, rx) = mpsc::channel(16);
    hotplug::spawn_monitor_thread(ctx.clone(), tx)
        .await
        .context("failed to subscribe to Thunderbolt events")?;

    let machine = machine_for(&config);
    let pass_ctx = ctx.clone();
    let trigger: Trigger = Arc::new(move || -> error::Result<()> {
        firmware::log_dmcub_versions(&pass_ctx);
        pass::run(&pass_ctx, &Selection::external(), Backend::Sysfs, machine).map(|_| ())
    });

    info!(
        "Watching for a dock matching {:?} (settle delay {:?}, {} policy)",
        config.dock_keywords, config.settle_delay, config.write
    );
    let watcher = DockWatcher::new(
        DockFilter::new(&config.dock_keywords),
        config.settle_delay,
        trigger,
    );
    watcher.run(rx, shutdown_signal()).await?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Can't listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

fn status(
    ctx: &DeviceContext,
    target: Target,
    backend: Backend,
    config: &Config,
) -> anyhow::Result<()> {
    println!("Connectors:");
    let connectors = discovery::scan(ctx, backend)?;
    if connectors.is_empty() {
        println!("  (none)");
    }
    for c in &connectors {
        let nodes: Vec<_> = c.aux_nodes.iter().map(|n| n.display().to_string()).collect();
        println!(
            "  {:<20} {:<16} {:<13} {}",
            c.name,
            c.kind.to_string(),
            c.status.to_string(),
            nodes.join(", ")
        );
    }

    println!("\nFirmware:");
    let versions = firmware::dmcub_versions(ctx);
    if versions.is_empty() {
        println!("  (no DMCUB firmware info)");
    }
    for fw in versions {
        println!("  dri/{} DMCUB {}", fw.dri, fw.version);
    }

    println!("\nDSC ({} target, {} decode):", target, config.decode);
    let machine = DscMachine::new(config.decode, config.write);
    let selection = selection_for(target);
    let devices = discovery::select(&connectors, &selection);
    if devices.is_empty() {
        println!("  (no connected devices)");
    }
    for device in &devices {
        let line = match AuxChannel::open(&device.path).and_then(|mut aux| machine.inspect(&mut aux)) {
            Ok((raw, state)) => format!("{} (0x{:02X})", state, raw),
            Err(e) => e.to_string(),
        };
        println!("  {:<20} {}", device.path.display(), line);
    }

    println!("\nPermissions:");
    let preflight = permissions::check_aux_permissions(ctx);
    for req in &preflight.requirements {
        println!("  {:<22} {:<8} {}", req.name, req.status.to_string(), req.description);
    }
    println!("  {}", preflight.summary());

    Ok(())
}
