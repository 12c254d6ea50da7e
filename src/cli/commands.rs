//! Handlers behind each CLI subcommand.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::io::Read;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    ConfigAction, ConfigOpts, PolicyAction, PolicyOpts, ProjectAction, ProjectOpts, RotateOpts,
    SecretAction, SecretOpts, ServeOpts,
};
use crate::config::{read_config_file_snapshot, validate_config, validate_config_object, Config};
use crate::logging;
use crate::rotation::{PolicyDraft, RotationReport, RotationStatus};
use crate::service::VaultService;
use crate::vault::{meta_keys, SecretAddress, SecretWrite};

/// Load configuration and install logging from it.
pub fn load_config(path: Option<&str>) -> Result<Config> {
    let config = Config::load(path)?;
    logging::init(&config.logging);
    match &config.source {
        Some(source) => info!(path = %source.display(), "configuration loaded"),
        None => info!("no configuration file found, using defaults"),
    }
    Ok(config)
}

fn open(path: Option<&str>) -> Result<VaultService> {
    let config = load_config(path)?;
    validate_config_object(&config)?;
    VaultService::open(&config)
}

fn parse_address(raw: &str) -> Result<SecretAddress> {
    raw.parse().map_err(anyhow::Error::msg)
}

pub async fn serve(opts: ServeOpts) -> Result<()> {
    let mut config = load_config(opts.config.as_deref())?;
    if let Some(secs) = opts.tick_secs {
        config.scheduler.tick_interval_secs = secs;
    }
    validate_config_object(&config)?;
    let service = VaultService::open(&config)?;

    if !config.scheduler.enabled {
        warn!("scheduler is disabled in configuration; nothing to run");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let scheduler = service.scheduler();
    let token = cancel.clone();
    let worker = tokio::spawn(async move { scheduler.run(token).await });

    tokio::signal::ctrl_c()
        .await
        .context("Cannot listen for shutdown signal")?;
    info!("shutdown requested");
    cancel.cancel();
    worker.await.context("Scheduler task panicked")?;
    Ok(())
}

pub async fn secret(opts: SecretOpts) -> Result<()> {
    let service = open(opts.config.as_deref())?;
    match opts.action {
        SecretAction::Get { address, reveal } => {
            let address = parse_address(&address)?;
            let Some(entry) = service.get_secret(&address).await? else {
                bail!("Secret '{address}' not found");
            };
            println!("address:      {address}");
            println!("version:      {}", entry.version);
            println!("description:  {}", entry.description);
            println!("tags:         {}", entry.tags.iter().cloned().collect::<Vec<_>>().join(", "));
            println!("created:      {}", entry.created.to_rfc3339());
            println!("lastUpdated:  {}", entry.last_updated.to_rfc3339());
            if let Some(expires) = entry.expires {
                println!("expires:      {}", expires.to_rfc3339());
            }
            for (key, value) in &entry.meta {
                println!("meta.{key}: {value}");
            }
            if reveal {
                if let Some(value) = service.reveal_secret(&address).await? {
                    println!("value:        {}", value.as_str());
                }
            }
        }
        SecretAction::Set {
            address,
            value,
            description,
            tags,
            expires,
            env_var,
        } => {
            let address = parse_address(&address)?;
            let value = match value {
                Some(value) => zeroize::Zeroizing::new(value),
                None => {
                    let mut buf = zeroize::Zeroizing::new(String::new());
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Cannot read value from stdin")?;
                    zeroize::Zeroizing::new(buf.trim_end_matches(['\r', '\n']).to_string())
                }
            };
            let expires = expires
                .map(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|t| t.with_timezone(&Utc))
                        .with_context(|| format!("Invalid --expires '{raw}'"))
                })
                .transpose()?;
            let mut write = SecretWrite {
                description,
                tags: (!tags.is_empty()).then(|| tags.into_iter().collect()),
                expires,
                ..Default::default()
            };
            if let Some(env_var) = env_var {
                write = write.with_meta(meta_keys::ENV_VAR, env_var);
            }
            let entry = service.set_secret(&address, &value, write).await?;
            println!("{address} is now at version {}", entry.version);
        }
        SecretAction::Delete { address } => {
            let address = parse_address(&address)?;
            if service.delete_secret(&address).await? {
                println!("deleted {address}");
            } else {
                bail!("Secret '{address}' not found");
            }
        }
        SecretAction::List { project, category } => {
            for summary in service.list_secrets(&project, category.as_deref()).await? {
                println!(
                    "{}\tv{}\t{}\t{}",
                    summary.address,
                    summary.version,
                    summary.last_updated.to_rfc3339(),
                    summary.description
                );
            }
        }
    }
    Ok(())
}

pub async fn project(opts: ProjectOpts) -> Result<()> {
    let service = open(opts.config.as_deref())?;
    match opts.action {
        ProjectAction::Create { name } => {
            if service.create_project(&name).await? {
                println!("created project {name}");
            } else {
                println!("project {name} already exists");
            }
        }
        ProjectAction::List => {
            for name in service.list_projects().await? {
                println!("{name}");
            }
        }
    }
    Ok(())
}

pub async fn policy(opts: PolicyOpts) -> Result<()> {
    let service = open(opts.config.as_deref())?;
    match opts.action {
        PolicyAction::Apply { file, id } => {
            let draft = read_policy_draft(Path::new(&file))?;
            let policy = service.save_policy(draft, id.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&policy)?);
        }
        PolicyAction::Get { id } => match service.get_policy(&id).await? {
            Some(policy) => println!("{}", serde_json::to_string_pretty(&policy)?),
            None => bail!("Rotation policy '{id}' not found"),
        },
        PolicyAction::List => {
            for policy in service.list_policies().await? {
                println!(
                    "{}\t{}\t{}\t{}\tnext {}",
                    policy.policy_id,
                    policy.secret_address(),
                    policy.rotation_interval,
                    if policy.is_enabled { "enabled" } else { "disabled" },
                    policy.next_rotation_date.to_rfc3339()
                );
            }
        }
        PolicyAction::Delete { id } => {
            if service.delete_policy(&id).await? {
                println!("deleted policy {id}");
            } else {
                bail!("Rotation policy '{id}' not found");
            }
        }
    }
    Ok(())
}

pub async fn rotate(opts: RotateOpts) -> Result<()> {
    let service = open(opts.config.as_deref())?;
    let report = service.rotate_now(&opts.policy_id).await;
    print_report(&report);
    match report.status {
        RotationStatus::Succeeded => Ok(()),
        RotationStatus::Skipped => bail!("Rotation of '{}' is already in progress", opts.policy_id),
        RotationStatus::Failed => bail!(
            "Rotation of '{}' failed{}",
            opts.policy_id,
            report
                .failure
                .as_ref()
                .map(|f| format!(": {f}"))
                .unwrap_or_default()
        ),
    }
}

pub fn config(opts: ConfigOpts) -> Result<()> {
    match opts.action {
        ConfigAction::Show => {
            let config = load_config(opts.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Validate => {
            let config = load_config(opts.config.as_deref())?;
            let errors = validate_config(&config);
            if errors.is_empty() {
                println!("Configuration is valid");
            } else {
                for error in &errors {
                    eprintln!("{error}");
                }
                bail!("{} configuration error(s)", errors.len());
            }
        }
        ConfigAction::Init => {
            let path = opts.config.as_deref().unwrap_or("vaultkeeper.json");
            if Path::new(path).exists() {
                bail!("Refusing to overwrite existing '{path}'");
            }
            Config::write_default(path)?;
            println!("Configuration file created at {path}");
        }
    }
    Ok(())
}

fn read_policy_draft(path: &Path) -> Result<PolicyDraft> {
    let value = read_config_file_snapshot(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("Invalid rotation policy in '{}'", path.display()))
}

fn print_report(report: &RotationReport) {
    println!("policy:        {}", report.policy_id);
    println!("status:        {:?}", report.status);
    println!("valueWritten:  {}", report.value_written);
    if let Some(version) = report.version {
        println!("version:       {version}");
    }
    for hook in &report.hooks {
        println!(
            "hook:          {} {} -> {:?}{}",
            hook.timing,
            hook.target,
            hook.result,
            if hook.required { " (required)" } else { "" }
        );
    }
    for delivery in &report.notifications {
        match &delivery.error {
            None => println!("notified:      {} {}", delivery.channel, delivery.target),
            Some(e) => println!("notify failed: {} {}: {e}", delivery.channel, delivery.target),
        }
    }
    if let Some(next) = report.next_rotation {
        println!("nextRotation:  {}", next.to_rfc3339());
    }
}
