use chainfs::{FileSystem, FsConfig, MountPolicy, VolumeFile, DEFAULT_VOLUME_SIZE};
use clap::{Parser, Subcommand};
use eyre::{Context, Result};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::trace;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
struct Cli {
    /// Volume file, created if missing
    #[arg(short = 'v', long, default_value = "chainfs.img")]
    volume: PathBuf,
    /// Size of the volume file in bytes
    #[arg(long, default_value_t = DEFAULT_VOLUME_SIZE)]
    size: usize,
    /// Refuse to touch a file that holds no volume instead of formatting it
    #[arg(long)]
    strict: bool,
    /// Inode table blocks used when formatting
    #[arg(long)]
    inode_blocks: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Erase the volume and create an empty root directory
    Format,
    Ls {
        #[arg(index = 1, default_value = "/")]
        path: String,
    },
    Mkdir {
        #[arg(index = 1)]
        path: String,
    },
    Touch {
        #[arg(index = 1)]
        path: String,
    },
    Cat {
        #[arg(index = 1)]
        path: String,
    },
    /// Replace a file's content, read from stdin when not given
    Write {
        #[arg(index = 1)]
        path: String,
        #[arg(index = 2)]
        content: Option<String>,
    },
    Df,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
    trace!("Starting up chainfs cli");

    let mut config = FsConfig::default();
    if cli.strict {
        config.policy = MountPolicy::Strict;
    }
    if let Some(blocks) = cli.inode_blocks {
        config.inode_table_blocks = blocks;
    }
    let store = VolumeFile::open(&cli.volume, cli.size)?;
    let mut fs = match cli.command {
        Command::Format => FileSystem::format(store, config).wrap_err("Failed to format volume")?,
        _ => FileSystem::mount(store, config)
            .wrap_err_with(|| format!("Failed to mount {:?}", cli.volume))?,
    };

    match cli.command {
        Command::Format => {}
        Command::Ls { path } => {
            for entry in fs.list_dir(&path)? {
                let kind = if entry.is_dir { 'd' } else { '-' };
                println!("{kind} {:>8} {:>5} {}", entry.size, entry.inode, entry.name);
            }
        }
        Command::Mkdir { path } => fs.create_file(&path, true)?,
        Command::Touch { path } => fs.create_file(&path, false)?,
        Command::Cat { path } => {
            let content = fs.get_content(&path)?;
            std::io::stdout().write_all(&content)?;
        }
        Command::Write { path, content } => {
            let content = match content {
                Some(content) => content.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            fs.set_content(&path, &content)
                .wrap_err_with(|| format!("Failed to write {path:?}"))?;
        }
        Command::Df => {
            let usage = fs.usage();
            println!(
                "{} blocks, {} free, {} inode slots, last inode {}",
                usage.block_count, usage.free_blocks, usage.inode_slots, usage.inode_counter
            );
        }
    }
    fs.into_store().sync()?;
    Ok(())
}
