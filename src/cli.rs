use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level by default (RUST_LOG still takes precedence).
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Build(BuildArgs),
    Fetch(FetchArgs),
    Segment(SegmentArgs),
    Images {
        #[command(subcommand)]
        command: ImagesCommand,
    },
    Site(SiteArgs),
    Stats(StatsArgs),
}

#[derive(Debug, Subcommand)]
pub enum ImagesCommand {
    Rewrite(ImagesRewriteArgs),
    Download(ImagesDownloadArgs),
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Short story name (used for directory and file names).
    #[arg(long)]
    pub story: String,

    /// Remote node id of the story.
    #[arg(long)]
    pub node_id: String,

    /// Workspace directory (raw/segmented/archive/site).
    #[arg(long)]
    pub out: String,

    /// Base URL of the remote API.
    #[arg(long, default_value = "https://fiction.live")]
    pub api_base: String,

    /// Render poll results into chapters.
    #[arg(long)]
    pub include_polls: bool,

    /// Render reader write-ins into chapters.
    #[arg(long)]
    pub include_writeins: bool,

    /// Delete the cached manifest and fetch it again.
    #[arg(long)]
    pub force_refresh_manifest: bool,

    /// Delete the newest cached regular chapter and fetch it again.
    #[arg(long)]
    pub force_refresh_latest_chapter: bool,

    /// Delete all cached appendix chapters and fetch them again.
    #[arg(long)]
    pub force_refresh_appendices: bool,

    /// Download every image again, ignoring existing local files.
    #[arg(long)]
    pub force_redownload_images: bool,

    /// Base delay after each remote request (politeness).
    #[arg(long, default_value_t = 2000)]
    pub delay_ms: u64,

    /// Upper bound of the random extra delay added to each wait.
    #[arg(long, default_value_t = 1000)]
    pub jitter_ms: u64,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Short story name (used for directory and file names).
    #[arg(long)]
    pub story: String,

    /// Remote node id of the story.
    #[arg(long)]
    pub node_id: String,

    /// Workspace directory (raw/segmented/archive/site).
    #[arg(long)]
    pub out: String,

    /// Base URL of the remote API.
    #[arg(long, default_value = "https://fiction.live")]
    pub api_base: String,

    /// Delete the cached manifest and fetch it again.
    #[arg(long)]
    pub force_refresh_manifest: bool,

    /// Delete the newest cached regular chapter and fetch it again.
    #[arg(long)]
    pub force_refresh_latest_chapter: bool,

    /// Delete all cached appendix chapters and fetch them again.
    #[arg(long)]
    pub force_refresh_appendices: bool,

    /// Base delay after each remote request (politeness).
    #[arg(long, default_value_t = 2000)]
    pub delay_ms: u64,

    /// Upper bound of the random extra delay added to each wait.
    #[arg(long, default_value_t = 1000)]
    pub jitter_ms: u64,
}

#[derive(Debug, Args)]
pub struct SegmentArgs {
    /// Short story name (used for directory and file names).
    #[arg(long)]
    pub story: String,

    /// Workspace directory (raw/segmented/archive/site).
    #[arg(long)]
    pub out: String,

    /// Render poll results into chapters.
    #[arg(long)]
    pub include_polls: bool,

    /// Render reader write-ins into chapters.
    #[arg(long)]
    pub include_writeins: bool,
}

#[derive(Debug, Args)]
pub struct ImagesRewriteArgs {
    /// Short story name (used for directory and file names).
    #[arg(long)]
    pub story: String,

    /// Workspace directory (raw/segmented/archive/site).
    #[arg(long)]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct ImagesDownloadArgs {
    /// Short story name (used for directory and file names).
    #[arg(long)]
    pub story: String,

    /// Workspace directory (raw/segmented/archive/site).
    #[arg(long)]
    pub out: String,

    /// Download every image again, ignoring existing local files.
    #[arg(long)]
    pub force_redownload: bool,

    /// Base delay after each image download (politeness).
    #[arg(long, default_value_t = 2000)]
    pub delay_ms: u64,

    /// Upper bound of the random extra delay added to each wait.
    #[arg(long, default_value_t = 1000)]
    pub jitter_ms: u64,
}

#[derive(Debug, Args)]
pub struct SiteArgs {
    /// Short story name (used for directory and file names).
    #[arg(long)]
    pub story: String,

    /// Workspace directory (raw/segmented/archive/site).
    #[arg(long)]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Short story name (used for directory and file names).
    #[arg(long)]
    pub story: String,

    /// Workspace directory (raw/segmented/archive/site).
    #[arg(long)]
    pub out: String,
}
