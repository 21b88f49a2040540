//! Check command implementation.
//!
//! Verifies that the kernel interfaces, the nft binary and optionally the
//! Docker API are reachable with the effective configuration.

use anyhow::{bail, Result};
use nix::unistd::geteuid;
use std::path::PathBuf;

use node_stats_exporter::config::{validate_effective_config, Config};
use node_stats_exporter::docker::DockerClient;
use node_stats_exporter::fs::{FileSystem, RealFs};
use node_stats_exporter::nftables::{list_ruleset, Ruleset};
use node_stats_exporter::scrape::HostPaths;

/// Files read from the proc root by the host collectors.
const PROC_FILES: [&str; 6] = ["loadavg", "stat", "meminfo", "diskstats", "net/dev", "vmstat"];

/// Cgroup v1 hierarchies walked by the cgroup collectors.
const CGROUP_SUBSYSTEMS: [&str; 3] = ["memory", "cpu,cpuacct", "blkio"];

fn report(ok: bool, message: impl AsRef<str>) -> bool {
    if ok {
        println!("   ✅ {}", message.as_ref());
    } else {
        println!("   ❌ {}", message.as_ref());
    }
    ok
}

/// Validates system requirements and configuration.
pub async fn command_check(config: &Config, docker: bool) -> Result<()> {
    println!("🔍 node-stats-exporter - System Check");
    println!("=====================================");

    let fs = RealFs;
    let paths = HostPaths::from_config(config);
    let mut all_ok = true;

    println!("\n📁 Checking {}...", paths.proc_root.display());
    for rel in PROC_FILES {
        let path = paths.proc(rel);
        let ok = fs.read_to_string(&path).is_ok();
        all_ok &= report(ok, format!("{}", path.display()));
    }

    println!("\n🗂  Checking cgroup hierarchies...");
    for subsystem in CGROUP_SUBSYSTEMS {
        let dir = paths.cgroup(subsystem);
        if fs.is_dir(&dir) {
            report(true, format!("{}", dir.display()));
        } else {
            // cgroup v2-only hosts have none of these; not fatal
            println!("   ⚠️  {} not mounted", dir.display());
        }
    }

    let block: PathBuf = paths.sys("block");
    all_ok &= report(fs.is_dir(&block), format!("{}", block.display()));

    println!("\n🧱 Checking nftables...");
    if !geteuid().is_root() {
        println!("   ⚠️  Not running as root, nft may be unable to list the ruleset");
    }
    let nft = config.nft_path();
    match list_ruleset(&nft).and_then(|json| Ruleset::from_slice(&json)) {
        Ok(ruleset) => {
            report(true, format!("{} returned {} rules", nft.display(), ruleset.rules.len()));
        }
        Err(e) => {
            all_ok &= report(false, format!("{}", e));
        }
    }

    if docker {
        println!("\n🐳 Checking Docker API...");
        let client = DockerClient::from_config(config);
        match client.containers().await {
            Ok(containers) => {
                report(
                    true,
                    format!(
                        "{} answered, {} running containers",
                        client.socket().display(),
                        containers.len()
                    ),
                );
            }
            Err(e) => {
                all_ok &= report(false, format!("{}", e));
            }
        }
    }

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(()) => {
            report(true, "Configuration is valid");
        }
        Err(e) => {
            all_ok &= report(false, format!("Configuration invalid: {}", e));
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        bail!("some checks failed - please review the output above");
    }
}
