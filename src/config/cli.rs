use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "small-stack")]
#[command(about = "A small runner that wires local services into a stack")]
pub struct Cli {
    #[arg(
        short = 'f',
        long = "file",
        global = true,
        default_value = "stack.yaml",
        help = "Path to the stack descriptor"
    )]
    pub file: String,

    #[arg(
        long,
        global = true,
        help = "Project env file for ${VAR} interpolation (default: .env next to the descriptor)"
    )]
    pub env_file: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Directory for named volumes and run state (default: .small-stack next to the descriptor)"
    )]
    pub state_dir: Option<String>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the stack and supervise it in the foreground
    Up {
        /// Only start these services (their dependencies are pulled in)
        services: Vec<String>,

        #[arg(long, help = "Log CPU/memory usage of supervised services")]
        monitor: bool,
    },
    /// Validate the descriptor and print its resolved form
    Config {
        #[arg(long, help = "Render as JSON instead of YAML")]
        json: bool,

        #[arg(long, help = "Print the startup order only")]
        services: bool,
    },
    /// Show the recorded state of the most recent run
    Ps,
}

impl Cli {
    pub fn descriptor_path(&self) -> PathBuf {
        PathBuf::from(&self.file)
    }

    pub fn descriptor_dir(&self) -> PathBuf {
        let path = self.descriptor_path();
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn env_file_override(&self) -> Option<PathBuf> {
        self.env_file.as_ref().map(PathBuf::from)
    }

    pub fn resolve_state_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => PathBuf::from(dir),
            None => self.descriptor_dir().join(".small-stack"),
        }
    }
}
