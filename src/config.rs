use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_OUTPUT: &str = "video.mp4";
pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_PACKET_SIZE: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(
    name = "mp4-encoder",
    version,
    about = "Pipelined stream encoder: demuxer and muxer threads connected by a buffer-pool queue",
    after_help = "Examples:\n  mp4-encoder part1.dv part2.dv -o video.mp4\n  mp4-encoder input.dv -o out.mp4 --force --pool-size 1 --json"
)]
pub struct Cli {
    /// Input files. Each one is read by its own demuxer thread, in order,
    /// and they all feed the same muxer.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Overwrite an existing output file.
    #[arg(short, long)]
    pub force: bool,

    /// Number of packet buffers each demuxer preallocates.
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Size of one packet in bytes.
    #[arg(long, default_value_t = DEFAULT_PACKET_SIZE)]
    pub packet_size: usize,

    /// Fail if the muxer receives nothing for this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub stall_timeout: Option<u64>,

    /// Show only errors and warnings.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show everything, including queue internals.
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            log::LevelFilter::Warn
        } else if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }

    pub fn to_config(&self) -> anyhow::Result<EncoderConfig> {
        let mut builder = EncoderConfig::builder()
            .output_file(&self.output)
            .force(self.force)
            .pool_size(self.pool_size)
            .packet_size(self.packet_size)
            .progress(!self.quiet && !self.json);
        for input in &self.inputs {
            builder = builder.input_file(input);
        }
        if let Some(ms) = self.stall_timeout {
            builder = builder.stall_timeout(Duration::from_millis(ms));
        }
        builder.build()
    }
}

/// Settings for one encoder run.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub force: bool,
    pub pool_size: usize,
    pub packet_size: usize,
    pub stall_timeout: Option<Duration>,
    pub progress: bool,
}

impl EncoderConfig {
    pub fn builder() -> EncoderConfigBuilder {
        EncoderConfigBuilder::default()
    }
}

pub struct EncoderConfigBuilder {
    inputs: Vec<PathBuf>,
    output: PathBuf,
    force: bool,
    pool_size: usize,
    packet_size: usize,
    stall_timeout: Option<Duration>,
    progress: bool,
}

impl Default for EncoderConfigBuilder {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            force: false,
            pool_size: DEFAULT_POOL_SIZE,
            packet_size: DEFAULT_PACKET_SIZE,
            stall_timeout: None,
            progress: false,
        }
    }
}

impl EncoderConfigBuilder {
    /// Append an input; inputs are encoded in the order they are added
    pub fn input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = path.into();
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Show a progress line while muxing
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn build(self) -> anyhow::Result<EncoderConfig> {
        if self.inputs.is_empty() {
            return Err(anyhow::anyhow!("at least one input file is required"));
        }
        if self.pool_size == 0 {
            return Err(anyhow::anyhow!("pool size must be at least 1"));
        }
        if self.packet_size == 0 {
            return Err(anyhow::anyhow!("packet size must be at least 1 byte"));
        }

        Ok(EncoderConfig {
            inputs: self.inputs,
            output: self.output,
            force: self.force,
            pool_size: self.pool_size,
            packet_size: self.packet_size,
            stall_timeout: self.stall_timeout,
            progress: self.progress,
        })
    }
}
