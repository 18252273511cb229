use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use sublist_web_rs::config::Settings;
use sublist_web_rs::logging;
use sublist_web_rs::ports::{default_ports, parse_ports_str};
use sublist_web_rs::resolver::{self, HickoryResolver};
use sublist_web_rs::server::{self, AppState};
use sublist_web_rs::types::{ScanOptions, SubdomainInfo};
use sublist_web_rs::validate;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();
    logging::init_tracing(&settings.log_level)?;

    let resolver = Arc::new(HickoryResolver::from_system(settings.dns_timeout()));

    if let Some(raw) = settings.domain.as_deref() {
        return run_once(&settings, raw, &resolver).await;
    }

    info!(
        bind = %settings.bind,
        ui_dir = %settings.ui_dir.display(),
        rate_limit = settings.rate_limit_max,
        "starting sublist-web-rs"
    );
    let state = AppState::new(settings, resolver);
    server::serve(state).await
}

async fn run_once(settings: &Settings, raw: &str, resolver: &HickoryResolver) -> Result<()> {
    let domain = validate::normalize_domain(raw)?;
    let ports = match settings.ports.as_deref() {
        Some(list) => parse_ports_str(list).context("parsing --ports")?,
        None => default_ports(),
    };
    let options = ScanOptions {
        ports,
        ..ScanOptions::default()
    };

    println!("Enumerating subdomains of {domain}...");
    let results = resolver::enumerate(resolver, &domain, &options).await;
    print_results_table(&domain, &results);

    if let Some(path) = settings.output.as_deref() {
        write_results_json(path, &results)
            .with_context(|| format!("writing JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }
    Ok(())
}

fn print_results_table(domain: &str, results: &[SubdomainInfo]) {
    let mut sub_w = "subdomain".len();
    let mut ip_w = "ip".len();
    for r in results {
        sub_w = sub_w.max(r.subdomain.len());
        ip_w = ip_w.max(r.ip_addresses.join(",").len());
    }

    println!("\nFound {} subdomains of {}", results.len(), domain);
    println!("{:<sub_w$}  {:<ip_w$}  cname", "subdomain", "ip");
    println!("{:-<sub_w$}  {:-<ip_w$}  -----", "", "");
    for r in results {
        println!(
            "{:<sub_w$}  {:<ip_w$}  {}",
            r.subdomain,
            r.ip_addresses.join(","),
            r.cname.as_deref().unwrap_or("-"),
        );
    }
}

fn write_results_json(path: &Path, results: &[SubdomainInfo]) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
