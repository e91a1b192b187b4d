//! spokelink CLI Tool
//!
//! Command line interface for inspecting and exercising spokes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use spokelink_client::{HealthRecord, SpokeClient};
use spokelink_core::config::loader::load_config_from_path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spokelink-cli")]
#[command(about = "A CLI tool for discovering, checking and calling spokes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
        /// Include retry and TLS tuning
        #[arg(long)]
        advanced: bool,
    },
    /// Run one discovery pass and print the spoke directory
    Discover {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Check spoke health
    HealthCheck {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Specific cluster to check
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Send a request to a spoke
    Send {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Target cluster id
        #[arg(long)]
        cluster: String,
        /// Request path on the spoke
        #[arg(short, long)]
        path: String,
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Start the client and print the health summary periodically
    Watch {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Stop after this many seconds (runs until Ctrl+C when omitted)
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_config_from_path(&config) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - protocol: {}", cfg.protocol);
                    println!("  - discovery source: {}", cfg.discovery.source);
                    println!(
                        "  - health checks: {}",
                        if cfg.health_check.enabled { "enabled" } else { "disabled" }
                    );
                    println!("  - {} custom FQDNs configured", cfg.custom_fqdns.len());
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output, advanced } => {
            println!("Generating configuration file: {}", output);
            generate_config_file(&output, advanced)?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::Discover { config } => {
            let client = build_client(&config)?;
            discover_spokes(&client).await?;
        }
        Commands::HealthCheck { config, cluster } => {
            let client = build_client(&config)?;
            client.refresh().await?;
            check_spokes(&client, cluster.as_deref()).await?;
        }
        Commands::Send {
            config,
            cluster,
            path,
            method,
            data,
        } => {
            let client = build_client(&config)?;
            client.refresh().await?;
            send_request(&client, &cluster, &path, &method, data.as_deref()).await?;
        }
        Commands::Watch { config, seconds } => {
            let client = build_client(&config)?;
            watch_spokes(&client, seconds).await?;
        }
    }

    Ok(())
}

fn build_client(config_path: &str) -> Result<SpokeClient> {
    let cfg = load_config_from_path(config_path)?;
    Ok(SpokeClient::new(cfg)?)
}

/// 执行一次发现并打印目录
async fn discover_spokes(client: &SpokeClient) -> Result<()> {
    let count = client.refresh().await?;
    println!("🔍 Discovered {} spokes", count);

    let mut spokes: Vec<_> = client.list_spokes().into_values().collect();
    spokes.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
    for spoke in spokes {
        println!("Cluster: {}", spoke.cluster_id);
        println!("  Zone: {}", spoke.zone_id);
        println!("  FQDN: {}", spoke.fqdn);
        println!("  Status: {}", spoke.status);
        println!("  Last Seen: {}", spoke.last_seen.to_rfc3339());
    }
    Ok(())
}

/// 检查单个或全部spoke
async fn check_spokes(client: &SpokeClient, cluster: Option<&str>) -> Result<()> {
    if let Some(cluster_id) = cluster {
        println!("Checking cluster: {}", cluster_id);
        let record = client.check_health(cluster_id).await?;
        print_health(&record);
        if !record.is_healthy() {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("Checking all spokes...");
    let mut cluster_ids: Vec<String> = client.list_spokes().into_keys().collect();
    cluster_ids.sort();

    let mut unhealthy = 0usize;
    for cluster_id in &cluster_ids {
        let record = client.check_health(cluster_id).await?;
        if !record.is_healthy() {
            unhealthy += 1;
        }
        print_health(&record);
    }

    let summary = client.health_summary();
    println!();
    println!("🏥 Health Summary");
    println!("=================");
    println!("Total Spokes: {}", summary.total_spokes);
    println!("Healthy Spokes: {}", summary.healthy_spokes);
    println!("Unhealthy Spokes: {}", summary.unhealthy_spokes);
    println!("Health Ratio: {:.2}%", summary.health_ratio * 100.0);
    if summary.enabled_spokes > 0 && !summary.has_healthy_spokes() {
        println!("⚠️  No healthy spokes available");
    }

    if unhealthy > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_health(record: &HealthRecord) {
    let marker = if record.is_healthy() { "🟢" } else { "🔴" };
    print!("{} {} ({}): {}", marker, record.cluster_id, record.fqdn, record.status);
    if let Some(latency) = record.latency_ms {
        print!(" in {}ms", latency);
    }
    if let Some(error) = &record.error {
        print!(" - {}", error);
    }
    println!();
}

/// 发送请求并打印原始响应
async fn send_request(
    client: &SpokeClient,
    cluster_id: &str,
    path: &str,
    method: &str,
    data: Option<&str>,
) -> Result<()> {
    let method = Method::from_str(&method.to_uppercase())
        .with_context(|| format!("invalid HTTP method: {}", method))?;
    let payload = data
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("payload is not valid JSON")?;

    println!("Sending {} {} to cluster {}", method, path, cluster_id);
    let response = client
        .send(cluster_id, path, method, payload.as_ref())
        .await?;

    let status = response.status();
    println!(
        "Status: {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    let body = response.text().await?;
    if !body.is_empty() {
        println!("{}", body);
    }

    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// 运行后台循环并周期性打印健康统计
async fn watch_spokes(client: &SpokeClient, seconds: Option<u64>) -> Result<()> {
    client.start().await?;

    let report_every = client.config().health_check_interval();
    let deadline = seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
    let mut ticker = tokio::time::interval(report_every);

    loop {
        let until_deadline = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ticker.tick() => {
                let summary = client.health_summary();
                println!(
                    "spokes: {} enabled: {} healthy: {} unhealthy: {} unchecked: {} ratio: {:.2}%",
                    summary.total_spokes,
                    summary.enabled_spokes,
                    summary.healthy_spokes,
                    summary.unhealthy_spokes,
                    summary.unchecked_spokes,
                    summary.health_ratio * 100.0
                );
            }
            _ = until_deadline => {
                info!("Watch duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    client.stop().await;
    Ok(())
}

/// 生成配置文件
fn generate_config_file(output_path: &str, advanced: bool) -> Result<()> {
    let config_content = if advanced {
        r#"# spokelink Advanced Configuration File
# This configuration includes all available settings

protocol = "https"
timeout_seconds = 30
host_pattern = "spoke-agent"
domain_suffix = "spokes.example.com"
fqdn_template = "{{.HostPattern}}.{{.ClusterID}}.{{.DomainSuffix}}"

[tls]
enabled = true
skip_verify = false

[discovery]
# environment | database | crd | config
source = "environment"
# cluster_id:zone_id[:fqdn] entries, comma separated
spoke_list = "cluster-a:zone-1,cluster-b:zone-2:agent.cluster-b.internal"
refresh_interval_seconds = 60

[health_check]
enabled = true
interval_seconds = 30
timeout_seconds = 10
path = "/health"

[retry]
enabled = true
max_retries = 3
initial_delay_ms = 100
max_delay_ms = 5000
backoff_multiplier = 2.0
jitter_enabled = true

# Per-cluster FQDN overrides
[custom_fqdns]
"cluster-c" = "spoke.cluster-c.example.net"
"#
    } else {
        r#"# spokelink Configuration File

protocol = "https"
domain_suffix = "spokes.example.com"

[discovery]
spoke_list = "cluster-a:zone-1,cluster-b:zone-2"

[health_check]
interval_seconds = 30
"#
    };

    std::fs::write(output_path, config_content)?;
    Ok(())
}
