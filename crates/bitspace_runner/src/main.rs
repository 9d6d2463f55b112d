// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bitspace circuit runner
//!
//! Usage: `bitspace-run [config.ron]`
//!
//! Builds the configured circuit, applies the input overrides and prints
//! every node's outputs in upstream-first order.

mod config;
mod runner;

use config::RunnerConfig;
use runner::RunReport;
use std::path::PathBuf;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match RunnerConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(2);
            }
        },
        None => RunnerConfig::default(),
    };

    init_logging(&config.log_filter);
    tracing::info!("Starting Bitspace runner v{}", env!("CARGO_PKG_VERSION"));

    match runner::run(&config) {
        Ok(report) => {
            print_report(&report);
            if !report.faults.is_empty() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}

fn init_logging(filter: &str) {
    let directive = filter.parse::<Directive>().unwrap_or_else(|e| {
        eprintln!("Ignoring log filter `{filter}`: {e}");
        LevelFilter::INFO.into()
    });
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(directive);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_report(report: &RunReport) {
    for node in &report.nodes {
        println!("{} ({})", node.id, node.kind);
        for (key, value) in &node.outputs {
            match value {
                Some(value) => println!("  {key} = {value}"),
                None => println!("  {key} = <none>"),
            }
        }
    }
    for (from, to) in &report.validation_failures {
        println!("rejected: {from} -> {to}");
    }
}
