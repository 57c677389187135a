use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use drivelist::{Drive, DriveList, InventoryOptions, Snapshot};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Table,
}

/// List the storage drives attached to this machine.
#[derive(Debug, Parser)]
#[command(name = "drivelist", version)]
struct Cli {
    #[arg(long, value_enum, default_value = "json")]
    format: Format,

    /// Indent JSON output.
    #[arg(long)]
    pretty: bool,

    /// Query devices on a worker pool.
    #[arg(long)]
    parallel: bool,

    /// Worker threads for --parallel (defaults to one per CPU).
    #[arg(long, value_name = "N", requires = "parallel")]
    threads: Option<usize>,

    /// Wrap the list with host details, an id and a timestamp.
    #[arg(long)]
    snapshot: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let options = if cli.parallel {
        InventoryOptions::parallel(cli.threads)
    } else {
        InventoryOptions::default()
    };
    debug!(concurrency = ?options.concurrency, snapshot = cli.snapshot, "enumerating drives");

    if cli.snapshot {
        let snapshot = drivelist::snapshot_with(&options);
        match cli.format {
            Format::Json => print_json(&snapshot, cli.pretty)?,
            Format::Table => print_snapshot_table(&snapshot),
        }
        return finish(&snapshot.drive_list);
    }

    let list = drivelist::get_drive_list_with(&options);
    match cli.format {
        Format::Json => print_json(&list, cli.pretty)?,
        Format::Table => print_table(&list),
    }
    let result = finish(&list);
    drivelist::free_drive_list(list);
    result
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "drivelist=debug,info"
    } else {
        "drivelist=info,warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .context("invalid log filter")?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install logger: {}", err))
}

fn finish(list: &DriveList) -> Result<()> {
    match list.error() {
        Some(error) => Err(anyhow!("drive enumeration failed: {}", error)),
        None => Ok(()),
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

fn print_snapshot_table(snapshot: &Snapshot) {
    println!(
        "host: {} {} ({})",
        snapshot.host.os, snapshot.host.os_version, snapshot.host.machine
    );
    println!("snapshot: {} at {}", snapshot.snapshot_id, snapshot.generated_at_utc);
    println!();
    print_table(&snapshot.drive_list);
}

fn print_table(list: &DriveList) {
    println!(
        "{:<24} {:>10}  {:<6} {:<32} {}",
        "DEVICE", "SIZE", "FLAGS", "DESCRIPTION", "MOUNTPOINTS"
    );
    for drive in list {
        println!(
            "{:<24} {:>10}  {:<6} {:<32} {}",
            drive.device,
            human_size(drive.size),
            flags(drive),
            drive.description,
            mountpoints(drive)
        );
        if let Some(error) = &drive.error {
            println!("  ! {}", error);
        }
    }
    for rejected in list.rejected() {
        println!("  skipped {}: {}", rejected.device, rejected.reason);
    }
}

/// One letter per set flag: System, Removable, Virtual, Protected, Internal.
fn flags(drive: &Drive) -> String {
    [
        (drive.system, 'S'),
        (drive.removable, 'R'),
        (drive.is_virtual, 'V'),
        (drive.protected, 'P'),
        (drive.internal, 'I'),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .map(|(_, letter)| *letter)
    .collect()
}

fn mountpoints(drive: &Drive) -> String {
    drive
        .mountpoints
        .iter()
        .map(|mount| match &mount.label {
            Some(label) => format!("{} ({})", mount.path, label),
            None => mount.path.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
