use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strobectl",
    version,
    about = "Strobe & lamp controller over TCP, with exposure/image correlation",
    long_about = "Drive a strobe/lamp controller over its line protocol and pair the exposures it\n\
                  reports with the images the capture software writes.\n\
                  Defaults come from STROBE_* environment variables (or a .env file)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a correlation session until Ctrl-C (or --duration-secs)
    Run(RunArgs),
    /// Send exact command text and show the replies
    Send(SendArgs),
    /// Ask the controller for its status
    Status(ReplyArgs),
    /// Switch the lamp off
    LampOff(ReplyArgs),
    /// Set strobe and/or lamp intensity (percent)
    Intensity(IntensityArgs),
    /// List the qualifying images in a directory
    Scan(ScanArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Clone, Default)]
pub struct ConnectArgs {
    /// Controller host [env: STROBE_HOST, default 192.168.2.70]
    #[arg(long)]
    pub host: Option<String>,

    /// Controller port [env: STROBE_PORT, default 9000]
    #[arg(long)]
    pub port: Option<u16>,

    /// Connection timeout in milliseconds
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Directory the capture software writes images into
    #[arg(long)]
    pub image_dir: Option<String>,

    /// Directory for correlation logs
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Maximum exposure/image time difference in seconds
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration_secs: Option<f64>,

    /// Print events as JSON lines
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Command text, sent exactly as given (one line per argument)
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    #[command(flatten)]
    pub reply: ReplyOptions,
}

#[derive(Args)]
pub struct ReplyArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    #[command(flatten)]
    pub reply: ReplyOptions,
}

#[derive(Args, Clone)]
pub struct ReplyOptions {
    /// How long to show replies before disconnecting, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub wait_ms: u64,

    /// Print events as JSON lines
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct IntensityArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Strobe intensity, 0-100
    #[arg(long)]
    pub strobe: Option<u32>,

    /// Lamp intensity, 0-100
    #[arg(long)]
    pub lamp: Option<u32>,

    #[command(flatten)]
    pub reply: ReplyOptions,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Directory to list [env: STROBE_IMAGE_DIR]
    #[arg(long)]
    pub dir: Option<String>,

    /// Case-insensitive file-name regex [env: STROBE_IMAGE_PATTERN]
    #[arg(long)]
    pub pattern: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write the JSON listing to a file instead of stdout (implies --json)
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write the JSON configuration to a file instead of stdout (implies --json)
    #[arg(short, long)]
    pub output: Option<String>,
}
