//! mirrorfs command-line probe.
//!
//! Builds a gateway over a mirror root and drives it the way a host would,
//! printing the audit stream as JSON lines on stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Run the lifecycle probe against a directory
//! mirrorfs --root /tmp/mirror probe
//!
//! # Same, with settings from a file
//! mirrorfs --config mirror.toml probe
//!
//! # Print the effective configuration
//! mirrorfs --root /tmp/mirror show-config
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mirrorfs_core::{
    FileAccess, FileAttributes, FileMode, FileShare, FsOperations, HostFileInfo, MirrorConfig, MirrorGateway,
    NtStatus,
};

/// Passthrough mirror gateway probe.
#[derive(Parser, Debug)]
#[command(name = "mirrorfs")]
#[command(about = "Drive the mirrorfs gateway and stream its audit trail")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mirror root; overrides the configured one
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an open/write/read/close lifecycle and print every audit event
    Probe {
        /// Name of the scratch file, relative to the root
        #[arg(long, default_value = "mirrorfs-probe.bin")]
        name: String,

        /// Bytes written and read back
        #[arg(long, default_value_t = 4096)]
        size: usize,

        /// Pretty-print each event
        #[arg(long)]
        pretty: bool,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Probe { name, size, pretty } => probe(&config, &name, size, pretty),
        Command::ShowConfig => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<MirrorConfig> {
    let mut config = match (&args.config, &args.root) {
        (Some(path), _) => MirrorConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        (None, Some(root)) => MirrorConfig::with_root(root),
        (None, None) => bail!("either --config or --root is required"),
    };
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    Ok(config)
}

fn probe(config: &MirrorConfig, name: &str, size: usize, pretty: bool) -> Result<()> {
    let gateway = MirrorGateway::new(config)
        .with_context(|| format!("mirror root {}", config.root.display()))?;
    let mut audit = gateway.subscribe(">");
    let host_path = format!("\\{}", name.trim_start_matches(['\\', '/']));
    let host = HostFileInfo::new(std::process::id());

    let steps = run_lifecycle(&gateway, &host, &host_path, size)?;

    for message in audit.drain() {
        let line = if pretty {
            serde_json::to_string_pretty(&message)?
        } else {
            serde_json::to_string(&message)?
        };
        println!("{line}");
    }

    for (step, status) in &steps {
        tracing::info!(step, %status, code = %format!("{:#010x}", status.code()), "probe step");
    }
    Ok(())
}

/// The open/create/write/read/close cycle, finishing with a delete so the
/// root is left as it was found.
fn run_lifecycle(
    ops: &dyn FsOperations,
    host: &HostFileInfo,
    path: &str,
    size: usize,
) -> Result<Vec<(&'static str, NtStatus)>> {
    let mut steps = Vec::new();
    let rw = FileAccess::GENERIC_READ | FileAccess::GENERIC_WRITE;
    let share = FileShare::READ | FileShare::WRITE;

    steps.push(("mounted", ops.mounted(host)?));

    let mut missing = host.clone();
    steps.push((
        "open missing",
        ops.create_file(path, rw, share, FileMode::Open, FileAttributes::empty(), &mut missing)?,
    ));

    let mut info = host.clone();
    let created = ops.create_file(path, rw, share, FileMode::CreateNew, FileAttributes::empty(), &mut info)?;
    steps.push(("create new", created));
    if !created.is_success() {
        bail!("could not create {path}: {created}");
    }

    let payload: Vec<u8> = (0..=255u8).cycle().take(size).collect();
    let written = ops.write_file(path, &payload, 0, &info)?;
    steps.push(("write", written.status));

    let mut back = vec![0u8; size];
    let read = ops.read_file(path, &mut back, 0, &info)?;
    steps.push(("read", read.status));
    if back[..read.data] != payload[..read.data] || read.data != written.data {
        bail!("read back {} of {} bytes, contents differ", read.data, written.data);
    }

    steps.push(("info", ops.get_file_information(path, &info)?.status));
    steps.push(("cleanup", ops.cleanup(path, &info)?));
    steps.push(("close", ops.close_file(path, &info)?));

    let mut again = host.clone();
    steps.push((
        "create existing",
        ops.create_file(path, rw, share, FileMode::CreateNew, FileAttributes::empty(), &mut again)?,
    ));

    let mut doomed = host.clone();
    let access = FileAccess::DELETE | FileAccess::SYNCHRONIZE;
    steps.push((
        "open for delete",
        ops.create_file(path, access, share | FileShare::DELETE, FileMode::Open, FileAttributes::empty(), &mut doomed)?,
    ));
    steps.push(("delete", ops.delete_file(path, &doomed)?));
    doomed.delete_on_close = true;
    steps.push(("cleanup delete", ops.cleanup(path, &doomed)?));
    steps.push(("close delete", ops.close_file(path, &doomed)?));

    steps.push(("unmounted", ops.unmounted(host)?));
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lifecycle_leaves_root_clean() {
        let dir = TempDir::new().unwrap();
        let gateway = MirrorGateway::new(&MirrorConfig::with_root(dir.path())).unwrap();
        let steps = run_lifecycle(&gateway, &HostFileInfo::new(1), "\\probe.bin", 512).unwrap();

        let status = |name: &str| steps.iter().find(|(s, _)| *s == name).map(|(_, st)| *st);
        assert_eq!(status("open missing"), Some(NtStatus::FileNotFound));
        assert_eq!(status("create new"), Some(NtStatus::Success));
        assert_eq!(status("create existing"), Some(NtStatus::FileExists));
        assert_eq!(status("cleanup delete"), Some(NtStatus::Success));
        assert!(!dir.path().join("probe.bin").exists());
        assert!(gateway.contexts().is_empty());
    }

    #[test]
    fn test_root_flag_overrides_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("m.toml");
        std::fs::write(&file, "root = \"/configured\"\n").unwrap();
        let args = Args::parse_from([
            "mirrorfs",
            "--config",
            file.to_str().unwrap(),
            "--root",
            "/override",
            "show-config",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.root, PathBuf::from("/override"));
    }

    #[test]
    fn test_requires_a_root() {
        let args = Args::parse_from(["mirrorfs", "show-config"]);
        assert!(load_config(&args).is_err());
    }
}
