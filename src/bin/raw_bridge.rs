// raw_bridge - LibRaw decode bridge CLI and daemon
// One-shot decodes from the command line, or a Unix Domain Socket service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use raw_bridge::organ::{BridgeOrgan, Organ, Response, Stimulus};
use raw_bridge::{convert, DecodeBridge, DecodeOptions, Limits, RgbFrame, Source};

/// Largest request frame accepted by the daemon
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "raw_bridge", version, about = "LibRaw decode bridge")]
struct Args {
    /// JSON file with decode options (fields not given keep their defaults)
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the LibRaw version
    Version,

    /// Extract the embedded JPEG thumbnail
    Thumbnail { input: PathBuf, output: PathBuf },

    /// Decode to 8-bit RGB (width/height header + pixels, or PNG with --png)
    Rgb {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        png: bool,
    },

    /// Print sensor dimensions
    Probe { input: PathBuf },

    /// Serve decode requests on a Unix socket
    Serve {
        #[arg(long, default_value = "/tmp/raw_bridge.sock")]
        socket_path: String,
    },
}

fn load_options(path: Option<&PathBuf>) -> Result<DecodeOptions> {
    match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read options file {}", p.display()))?;
            serde_json::from_str(&text).context("Failed to parse decode options")
        }
        None => Ok(DecodeOptions::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args = Args::parse();
    let options = load_options(args.options.as_ref())?;
    let bridge = DecodeBridge::new()
        .with_options(options)
        .with_limits(Limits::default());

    match args.command {
        Command::Version => {
            println!("{}", bridge.version());
        }
        Command::Thumbnail { input, output } => {
            let jpeg = bridge
                .decode_thumbnail(Source::Path(&input))
                .with_context(|| format!("Thumbnail extraction failed for {}", input.display()))?;
            std::fs::write(&output, &jpeg).context("Failed to write thumbnail")?;
            info!("Wrote {} ({} bytes)", output.display(), jpeg.len());
        }
        Command::Rgb { input, output, png } => {
            let rgb = bridge
                .decode_to_rgb(Source::Path(&input))
                .with_context(|| format!("Decode failed for {}", input.display()))?;
            let frame = RgbFrame::parse_with_limits(&rgb, bridge.limits())?;
            if png {
                convert::frame_to_image(&rgb)?
                    .save_with_format(&output, image::ImageFormat::Png)
                    .context("Failed to write PNG")?;
            } else {
                std::fs::write(&output, &rgb).context("Failed to write RGB result")?;
            }
            info!("Wrote {} ({}x{})", output.display(), frame.width, frame.height);
        }
        Command::Probe { input } => {
            let data = std::fs::read(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let (width, height) = bridge.probe(&data)?;
            println!("{}x{}", width, height);
        }
        Command::Serve { socket_path } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve(BridgeOrgan::with_bridge(bridge), socket_path))?;
        }
    }

    Ok(())
}

async fn serve(organ: BridgeOrgan, socket_path: String) -> Result<()> {
    info!("Starting raw_bridge daemon");
    info!("   Socket: {}", socket_path);
    info!("   LibRaw: {}", organ.bridge().version());

    let start_time = std::time::Instant::now();
    let organ = Arc::new(organ);

    // Remove old socket if exists
    let path = PathBuf::from(&socket_path);
    if path.exists() {
        std::fs::remove_file(&path)
            .context("Failed to remove old socket")?;
    }

    let listener = UnixListener::bind(&path)
        .context("Failed to bind Unix socket")?;

    info!("   Listening on {}", socket_path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let organ = Arc::clone(&organ);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, organ, start_time).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle a single UDS connection
async fn handle_connection(
    mut stream: UnixStream,
    organ: Arc<BridgeOrgan>,
    start_time: std::time::Instant,
) -> Result<()> {
    let mut buffer = vec![0u8; 65536];

    loop {
        // Read request length (4 bytes)
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("Request frame too large: {} bytes", len);
        }
        if len > buffer.len() {
            buffer.resize(len, 0);
        }

        stream.read_exact(&mut buffer[..len]).await?;

        let stimulus: Stimulus = serde_json::from_slice(&buffer[..len])
            .context("Failed to parse stimulus")?;

        debug!("Received: op={}", stimulus.op);

        // Health check is answered without touching the organ
        let response = if stimulus.op == "health" || stimulus.op == "health.check" {
            Response {
                ok: true,
                output: serde_json::json!({
                    "status": "healthy",
                    "organ": "raw_bridge",
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptime_ms": start_time.elapsed().as_millis() as u64,
                }),
                latency_ms: 0,
                cost: None,
            }
        } else {
            match organ.stimulate(stimulus).await {
                Ok(resp) => resp,
                Err(e) => {
                    error!("Stimulate error: {:?}", e);
                    Response {
                        ok: false,
                        output: serde_json::json!({
                            "error": e.kind_name(),
                            "message": e.to_string(),
                        }),
                        latency_ms: 0,
                        cost: None,
                    }
                }
            }
        };

        let response_bytes = serde_json::to_vec(&response)
            .context("Failed to serialize response")?;

        let len_bytes = (response_bytes.len() as u32).to_be_bytes();
        stream.write_all(&len_bytes).await?;
        stream.write_all(&response_bytes).await?;
        stream.flush().await?;

        debug!("Sent: ok={}, latency={}ms", response.ok, response.latency_ms);
    }
}
