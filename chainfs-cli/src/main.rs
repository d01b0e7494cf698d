use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::error;

use chainfs_core::catalog::Catalog;
use chainfs_core::chain::{ChainStore, Header};
use chainfs_core::client::Client;
use chainfs_core::config::Config;
use chainfs_core::crypto::kdf::SecretKey;
use chainfs_core::error::{ChainFsError, Result};
use chainfs_core::store::fs::FsStore;
use chainfs_core::vfs::{Entry, Vfs};

#[derive(Parser)]
#[command(author, version, about = "chainfs CLI", long_about = None)]
struct Cli {
    /// Root directory of the file-backed block store
    #[arg(long, default_value = ".chainfs-store")]
    store: PathBuf,

    /// Reference catalog file (build one with `chainfs catalog`)
    #[arg(long, default_value = "catalog.cbor")]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic reference catalog for the file-backed store
    Catalog {
        #[arg(default_value = "catalog.cbor")]
        out: PathBuf,
    },

    /// Upload a local file; prints the chain head id
    Upload {
        /// Secret key for encrypting the file
        key: String,
        /// Path to the file to upload
        file: PathBuf,
    },

    /// Download a chain into a directory
    Download {
        /// Secret key for decrypting the file
        key: String,
        /// The head block id of the file
        #[arg(short, long)]
        id: String,
        /// Directory to download the file into
        dir: PathBuf,
    },

    /// Remove a single chain
    Remove {
        /// Secret key for decrypting the chain
        key: String,
        /// The head block id of the chain
        #[arg(short, long)]
        id: String,
    },

    /// Virtual file system over the block store
    #[command(subcommand)]
    Vfs(VfsCommands),
}

#[derive(Subcommand)]
enum VfsCommands {
    /// Create a new VFS (connects instead if one exists for the key)
    New { key: String },
    /// Connect to an existing VFS
    Connect { key: String },
}

fn open_chains(store: &Path, catalog: &Path, key: &str) -> Result<ChainStore<FsStore>> {
    let config = Config::from_env()?;
    let store = FsStore::open(store)?;
    let catalog = Catalog::load(catalog)?;
    let key = SecretKey::derive(key)?;
    Ok(ChainStore::new(Client::new(store, &config), catalog, key))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog { out } => {
            Catalog::synthetic().save(&out)?;
            eprintln!("catalog written to {}", out.display());
        }

        Commands::Upload { key, file } => {
            let mut chains = open_chains(&cli.store, &cli.catalog, &key)?;
            let data = std::fs::read(&file)?;
            let mut header = Header::new();
            header.insert("filename".to_string(), file_name(&file)?);
            let head = chains.upload(&data, &header, None)?;
            println!("{head}");
        }

        Commands::Download { key, id, dir } => {
            let mut chains = open_chains(&cli.store, &cli.catalog, &key)?;
            let (header, data) = chains.download(&id)?;
            let name = header.get("filename").cloned().unwrap_or_else(|| id.clone());
            let out = dir.join(name);
            std::fs::write(&out, data)?;
            eprintln!("wrote {}", out.display());
        }

        Commands::Remove { key, id } => {
            let mut chains = open_chains(&cli.store, &cli.catalog, &key)?;
            chains.remove(&id)?;
        }

        Commands::Vfs(VfsCommands::New { key } | VfsCommands::Connect { key }) => {
            let chains = open_chains(&cli.store, &cli.catalog, &key)?;
            let mut vfs = Vfs::open(chains)?;
            session(&mut vfs)?;
        }
    }

    Ok(())
}

fn session(vfs: &mut Vfs<FsStore>) -> Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("/{} |> ", vfs.path()[1..].join("/"));
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF behaves like `exit`
            vfs.sync()?;
            return Ok(());
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let (cmd, arg) = match input.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (input, ""),
        };

        // navigation errors are recoverable; report and keep the session
        match run_command(vfs, cmd, arg) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e @ ChainFsError::RateLimited { .. }) => return Err(e),
            Err(e) => error!("{e}"),
        }
    }
}

/// Returns true when the session should end.
fn run_command(vfs: &mut Vfs<FsStore>, cmd: &str, arg: &str) -> Result<bool> {
    match cmd {
        "exit" => {
            println!("syncing...");
            vfs.sync()?;
            return Ok(true);
        }
        "cd" => vfs.cd(arg)?,
        "ls" => {
            let (files, dirs) = vfs.ls()?;
            for d in dirs {
                println!("{d}/");
            }
            for f in files {
                println!("{f}");
            }
        }
        "tree" => print_tree(vfs.tree(), 0),
        "mkdir" => {
            vfs.mkdir(arg)?;
            vfs.sync()?;
        }
        "touch" => {
            let path = Path::new(arg);
            let data = std::fs::read(path)?;
            vfs.touch(&file_name(path)?, &data)?;
            vfs.sync()?;
        }
        "fetch" => {
            let (_, data) = vfs.fetch(arg)?;
            std::fs::write(arg, data)?;
            println!("wrote {arg}");
        }
        "rm" => {
            vfs.rm(arg)?;
            vfs.sync()?;
        }
        "rmdir" => {
            vfs.rmdir(arg)?;
            vfs.sync()?;
        }
        _ => print_help(),
    }
    Ok(false)
}

fn print_tree(dir: &BTreeMap<String, Entry>, depth: usize) {
    for (name, entry) in dir {
        let indent = "  ".repeat(depth);
        match entry {
            Entry::File(head) => println!("{indent}{name}  [{head}]"),
            Entry::Directory(sub) => {
                println!("{indent}{name}/");
                print_tree(sub, depth + 1);
            }
        }
    }
}

fn print_help() {
    println!(
        "\
commands:
  cd <dir>       enter a directory (`cd ..` to go up)
  ls             list the current directory
  tree           show the whole tree
  mkdir <dir>    create a directory and enter it
  touch <path>   upload the local file at <path> into the current directory
  fetch <name>   download <name> into the working directory
  rm <name>      remove a file
  rmdir <dir>    remove an empty directory
  exit           sync and leave"
    );
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ChainFsError::Format(format!("{} has no file name", path.display())))
}
