//! # t02relay CLI
//!
//! Runs the print relay for a Phomemo T02, or renders jobs offline.
//!
//! ## Usage
//!
//! ```bash
//! # Run the relay: printer link, LAN peers and the HTTP API
//! t02relay serve --mac AA:BB:CC:DD:EE:FF --listen 0.0.0.0:8080
//!
//! # Also process the shared cloud queue while host
//! t02relay serve --firestore-project my-project
//!
//! # Preview an image as the printer would print it
//! t02relay render image photo.jpg --algorithm halftone --png out.png
//!
//! # Preview a banner
//! t02relay render text "HELLO" --banner --font-size 200 --png banner.png
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use t02relay::{
    RelayError,
    config::RelayConfig,
    logging::{self, RecentLogs},
    render::{DitheringAlgorithm, MonochromeBitmap, RasterOptions, rasterize_bytes},
    relay::Relay,
    router::{
        CloudQueue, FirestoreConfig, FirestoreQueue, JobRouter, LanPeerChannel, PeerChannel,
        peer_channel,
    },
    server,
    text::{Alignment, FontBook, FontFamily, LayoutMode, TextOptions, layout_text_with},
    transport::{LinkManager, RfcommRadio, event_channel},
};

/// t02relay - Print relay for the Phomemo T02 thermal printer
#[derive(Parser, Debug)]
#[command(name = "t02relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay and its HTTP API
    Serve(ServeArgs),

    /// Render a job to PNG without printing
    Render {
        #[command(subcommand)]
        job: RenderJob,
    },
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Address for the HTTP API
    #[arg(long, env = "T02_LISTEN", default_value = t02relay::config::DEFAULT_LISTEN)]
    listen: String,

    /// Printer MAC address, used to find its RFCOMM binding
    #[arg(long, env = "T02_MAC")]
    mac: Option<String>,

    /// RFCOMM device node (overrides --mac)
    #[arg(long, env = "T02_DEVICE")]
    device: Option<PathBuf>,

    /// Bytes per link write
    #[arg(long, default_value_t = 182)]
    write_size: usize,

    /// Name shown to other relays (defaults to the host name)
    #[arg(long, env = "T02_NAME")]
    name: Option<String>,

    /// TCP port for peer sessions (0 = any)
    #[arg(long, default_value_t = 0)]
    peer_port: u16,

    /// Seconds a client waits for a host before printing locally
    #[arg(long, default_value_t = 3)]
    peer_wait: u64,

    /// Seconds before a connect attempt is abandoned
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Directory with sans.ttf, serif.ttf, mono.ttf (and -bold variants)
    #[arg(long, env = "T02_FONT_DIR")]
    font_dir: Option<PathBuf>,

    /// Default dithering algorithm for image jobs
    #[arg(long, default_value = "floyd-steinberg")]
    algorithm: String,

    /// Default threshold for image jobs
    #[arg(long, default_value_t = 128)]
    threshold: u8,

    /// Firestore project for the cloud relay queue
    #[arg(long, env = "T02_FIRESTORE_PROJECT")]
    firestore_project: Option<String>,

    /// Firestore collection holding queued jobs
    #[arg(long, default_value = "print_jobs")]
    firestore_collection: String,

    /// Bearer token for Firestore requests
    #[arg(long, env = "T02_FIRESTORE_TOKEN", hide_env_values = true)]
    firestore_token: Option<String>,

    /// Recent log lines kept for the status endpoint
    #[arg(long, default_value_t = 100)]
    log_lines: usize,
}

#[derive(Subcommand, Debug)]
enum RenderJob {
    /// Rasterize an image file
    Image {
        path: PathBuf,

        /// threshold, floyd-steinberg or halftone
        #[arg(long, default_value = "floyd-steinberg")]
        algorithm: String,

        #[arg(long, default_value_t = 128)]
        threshold: u8,

        /// Keep landscape images unrotated
        #[arg(long)]
        no_rotate: bool,

        /// Output PNG file
        #[arg(long, value_name = "FILE")]
        png: PathBuf,
    },

    /// Lay out text
    Text {
        text: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, default_value_t = 40.0)]
        font_size: f32,

        /// sans, serif or mono
        #[arg(long, default_value = "sans")]
        font_family: String,

        /// left, center or right
        #[arg(long, default_value = "center")]
        align: String,

        /// Single line printed along the paper
        #[arg(long)]
        banner: bool,

        #[arg(long, env = "T02_FONT_DIR")]
        font_dir: Option<PathBuf>,

        /// Output PNG file
        #[arg(long, value_name = "FILE")]
        png: PathBuf,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), RelayError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = serve_config(args);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(config))
        }
        Commands::Render { job } => render(job),
    }
}

fn serve_config(args: ServeArgs) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listen_addr = args.listen;
    config.rfcomm_mac = args.mac;
    config.rfcomm_device = args.device;
    config.write_size = args.write_size.max(1);
    if let Some(name) = args.name.filter(|n| !n.trim().is_empty()) {
        config.display_name = name.trim().to_string();
    }
    config.peer_port = args.peer_port;
    config.peer_wait = Duration::from_secs(args.peer_wait);
    config.connect_timeout = Duration::from_secs(args.connect_timeout);
    config.font_dir = args.font_dir;
    config.raster = RasterOptions::new(DitheringAlgorithm::from_name(&args.algorithm), args.threshold);
    config.log_capacity = args.log_lines;
    config.cloud = args.firestore_project.map(|project| FirestoreConfig {
        collection: args.firestore_collection,
        token: args.firestore_token,
        ..FirestoreConfig::new(project)
    });
    config
}

async fn serve(config: RelayConfig) -> Result<(), RelayError> {
    let logs = RecentLogs::new(config.log_capacity);
    logging::init(&logs)?;

    let (events_tx, events_rx) = event_channel();
    let radio = Arc::new(RfcommRadio::new(config.rfcomm(), events_tx.clone()));
    let link = LinkManager::spawn(Arc::clone(&radio), (events_tx, events_rx), config.link_settings());
    radio.announce();

    let (peer_tx, peer_rx) = peer_channel();
    let peers: Arc<dyn PeerChannel> = Arc::new(LanPeerChannel::new(config.peer_port, peer_tx)?);
    let cloud = config
        .cloud
        .clone()
        .map(|c| Arc::new(FirestoreQueue::new(c)) as Arc<dyn CloudQueue>);
    let router = JobRouter::spawn(link.clone(), peers, peer_rx, cloud, config.router_settings());

    let relay = Arc::new(Relay::new(&config, link, router, logs));
    server::serve(relay, &config.listen_addr).await
}

fn render(job: RenderJob) -> Result<(), RelayError> {
    let config = RelayConfig::default();
    let printer = config.printer;

    let (bitmap, png) = match job {
        RenderJob::Image {
            path,
            algorithm,
            threshold,
            no_rotate,
            png,
        } => {
            let bytes = std::fs::read(&path)?;
            let options = RasterOptions {
                auto_rotate: !no_rotate,
                ..RasterOptions::new(DitheringAlgorithm::from_name(&algorithm), threshold)
            };
            let raster = rasterize_bytes(&bytes, &options, &printer)?;
            if raster.rotated {
                println!("Rotated landscape image to portrait");
            }
            (raster.bitmap, png)
        }
        RenderJob::Text {
            text,
            title,
            font_size,
            font_family,
            align,
            banner,
            font_dir,
            png,
        } => {
            let fonts = match &font_dir {
                Some(dir) => FontBook::from_dir(dir),
                None => FontBook::builtin(),
            };
            let options = TextOptions {
                text,
                title,
                font_size,
                font_family: FontFamily::from_name(&font_family),
                align: parse_alignment(&align)?,
                mode: if banner {
                    LayoutMode::Banner
                } else {
                    LayoutMode::Document
                },
            };
            let layout = layout_text_with(&options, &fonts, &printer, &config.metrics)?;
            println!("Laid out {} line(s) at {}px", layout.lines.len(), layout.font_size);
            (layout.bitmap, png)
        }
    };

    save_png(&png, &bitmap)?;
    println!(
        "Saved {}x{} preview to {}",
        bitmap.width(),
        bitmap.height(),
        png.display()
    );
    Ok(())
}

fn parse_alignment(name: &str) -> Result<Alignment, RelayError> {
    match name.trim().to_lowercase().as_str() {
        "left" => Ok(Alignment::Left),
        "center" | "centre" => Ok(Alignment::Center),
        "right" => Ok(Alignment::Right),
        other => Err(RelayError::InvalidCommand(format!(
            "unknown alignment '{}', expected left, center or right",
            other
        ))),
    }
}

/// Save a bitmap as a PNG image
fn save_png(path: &Path, bitmap: &MonochromeBitmap) -> Result<(), RelayError> {
    std::fs::write(path, bitmap.to_png()?)?;
    Ok(())
}
