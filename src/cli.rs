//! CLI arguments for vcenter-exporter.
//!
//! The exporter has a single mode of operation; the only option selects the
//! configuration file.

use clap::Parser;
use std::path::PathBuf;

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "vcenter-exporter",
    about = "Prometheus exporter for vCenter virtual machine performance counters",
    long_about = "Prometheus exporter for vCenter virtual machine performance counters.\n\n\
                  Polls the vSphere performance manager for every powered-on virtual machine \
                  carrying an ownership annotation and exposes the latest sample of each \
                  counter as a labeled gauge.",
    version
)]
pub struct Args {
    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
