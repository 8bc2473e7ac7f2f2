use std::path::PathBuf;

use blobcache_codec::Codec;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobcache",
    about = "Inspect and fill blobcache stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Operate on a SQLite-backed store
    Sqlite {
        /// Path of the database file
        store: PathBuf,
        #[command(subcommand)]
        op: SqliteOp,
    },
    /// Operate on a tar-backed store
    Archive {
        /// Path of the tar file
        store: PathBuf,
        #[command(subcommand)]
        op: ArchiveOp,
    },
}

#[derive(Subcommand)]
pub enum SqliteOp {
    /// Store a payload under a key, replacing any previous value
    Put(PutArgs),
    /// Store a file's contents
    PutFile(SqlitePutFileArgs),
    /// Print or save the payload of a key
    Get(GetArgs),
    /// List keys
    Ls,
    /// Delete a key
    Rm { key: String },
    /// Show row metadata
    Info { key: String },
    /// Rewrite the database file to reclaim space
    Vacuum,
}

#[derive(Subcommand)]
pub enum ArchiveOp {
    /// Append a payload under a key
    Put(PutArgs),
    /// Append a file under its base name
    PutFile { file: PathBuf },
    /// Print or save the payload of a key
    Get(ArchiveGetArgs),
    /// List distinct entry names
    Ls,
    /// Show every physical entry for a key
    Info { key: String },
}

#[derive(Args)]
pub struct PutArgs {
    pub key: String,
    /// Source file, or `-` for stdin
    pub file: PathBuf,
    /// Codec (sqlite only): none, deflate or zstd
    #[arg(long)]
    pub codec: Option<Codec>,
    /// Free-text comment (sqlite only)
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Args)]
pub struct SqlitePutFileArgs {
    pub file: PathBuf,
    /// Use the path as given instead of the base name as key
    #[arg(long)]
    pub full_path: bool,
    /// Always store zstd-compressed
    #[arg(long)]
    pub compress: bool,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
    /// Write the payload here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ArchiveGetArgs {
    #[command(flatten)]
    pub target: GetArgs,
    /// Return the earliest entry instead of the latest
    #[arg(long)]
    pub first: bool,
}
