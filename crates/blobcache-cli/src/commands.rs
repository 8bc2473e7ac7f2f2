use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context};
use blobcache_store::{
    ArchiveConfig, ArchiveStore, BlobStore, SqliteConfig, SqliteStore, StoreConfig,
};
use colored::Colorize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Sqlite { store, op } => run_sqlite(&store, config.sqlite, op),
        Command::Archive { store, op } => run_archive(&store, config.archive, op),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(StoreConfig::default()),
    }
}

fn run_sqlite(path: &Path, config: SqliteConfig, op: SqliteOp) -> anyhow::Result<()> {
    let default_codec = config.default_codec;
    let store = SqliteStore::open(path, config)
        .with_context(|| format!("opening {}", path.display()))?;

    match op {
        SqliteOp::Put(args) => {
            let data = read_input(&args.file)?;
            let codec = args.codec.unwrap_or(default_codec);
            store.put(&args.key, args.comment.as_deref().unwrap_or(""), &data, codec)?;
            println!(
                "{} Stored {} ({} bytes, {})",
                "✓".green(),
                args.key.bold(),
                data.len(),
                codec.to_string().cyan()
            );
        }
        SqliteOp::PutFile(args) => {
            let key = store.put_file(&args.file, !args.full_path, args.compress)?;
            println!("{} Stored {}", "✓".green(), key.bold());
        }
        SqliteOp::Get(args) => {
            let payload = store.get(&args.key)?;
            write_payload(&args.key, payload, args.output.as_deref())?;
        }
        SqliteOp::Ls => list_keys(&store)?,
        SqliteOp::Rm { key } => {
            if store.remove(&key)? {
                println!("{} Removed {}", "✓".green(), key.bold());
            } else {
                println!("{} not present", key.yellow());
            }
        }
        SqliteOp::Info { key } => match store.entry_info(&key)? {
            Some(info) => {
                println!("{}", info.key.bold());
                println!("  Written: {}", info.created);
                println!("  Codec:   {}", info.codec.to_string().cyan());
                match info.stored_len {
                    Some(len) => println!("  Stored:  {len} bytes"),
                    None => println!("  Stored:  {}", "no value".dimmed()),
                }
                if !info.comment.is_empty() {
                    println!("  Comment: {}", info.comment);
                }
            }
            None => bail!("key {key:?} not found"),
        },
        SqliteOp::Vacuum => {
            store.vacuum()?;
            println!("{} Vacuumed {}", "✓".green(), path.display());
        }
    }

    store.close();
    Ok(())
}

fn run_archive(path: &Path, config: ArchiveConfig, op: ArchiveOp) -> anyhow::Result<()> {
    let store = ArchiveStore::open(path, config)
        .with_context(|| format!("opening {}", path.display()))?;

    match op {
        ArchiveOp::Put(args) => {
            if args.codec.is_some() || args.comment.is_some() {
                eprintln!(
                    "{} --codec and --comment are ignored for archive stores",
                    "warning:".yellow()
                );
            }
            let data = read_input(&args.file)?;
            store.put_bytes(&args.key, &data)?;
            println!("{} Appended {} ({} bytes)", "✓".green(), args.key.bold(), data.len());
        }
        ArchiveOp::PutFile { file } => {
            let key = store.put_file(&file)?;
            println!("{} Appended {}", "✓".green(), key.bold());
        }
        ArchiveOp::Get(args) => {
            let payload = store.get_bytes(&args.target.key, args.first)?;
            write_payload(&args.target.key, payload, args.target.output.as_deref())?;
        }
        ArchiveOp::Ls => list_keys(&store)?,
        ArchiveOp::Info { key } => {
            let entries: Vec<_> = store.entries()?.into_iter().filter(|e| e.name == key).collect();
            if entries.is_empty() {
                bail!("key {key:?} not found");
            }
            println!("{} ({} entries)", key.bold(), entries.len());
            for entry in entries {
                let mtime = chrono::DateTime::<chrono::Utc>::from_timestamp(entry.mtime as i64, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| entry.mtime.to_string());
                println!(
                    "  @{:<10} {:>10} bytes  mode {:o}  {}",
                    entry.offset,
                    entry.size,
                    entry.mode,
                    mtime.dimmed()
                );
            }
        }
    }

    store.close();
    Ok(())
}

fn list_keys(store: &dyn BlobStore) -> anyhow::Result<()> {
    let mut keys = store.keys()?;
    keys.sort();
    for key in &keys {
        println!("{key}");
    }
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data).context("reading stdin")?;
        return Ok(data);
    }
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_payload(key: &str, payload: Option<Vec<u8>>, output: Option<&Path>) -> anyhow::Result<()> {
    let Some(payload) = payload else {
        bail!("key {key:?} not found");
    };
    match output {
        Some(path) => {
            std::fs::write(path, &payload).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} Wrote {} bytes to {}", "✓".green(), payload.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&payload)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
