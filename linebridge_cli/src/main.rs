mod preview;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use linebridge_core::{
    BridgeConfig, Framebuffer, ModuleBinary, ModuleHost, RenderSession, SharedSurface,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "linebridge", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a module and report the outcome
    Render {
        /// Path to the module (.wasm or .wat)
        #[arg(long)]
        module: Option<PathBuf>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Raster width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Raster height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Arena size in 64 KiB pages
        #[arg(long)]
        pages: Option<u32>,

        /// Fuel granted to the module per render
        #[arg(long)]
        fuel: Option<u64>,

        /// Print the rendered image using terminal colours
        #[arg(long)]
        preview: bool,
    },
    /// List a module's imports and exports and check them against the host ABI
    Inspect {
        /// Path to the module (.wasm or .wat)
        #[arg(long)]
        module: PathBuf,

        /// Arena size in 64 KiB pages to check the memory import against
        #[arg(long, default_value_t = 2)]
        pages: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Render {
            module,
            config,
            width,
            height,
            pages,
            fuel,
            preview,
        } => {
            let overrides = Overrides {
                module,
                width,
                height,
                pages,
                fuel,
            };
            render(config, overrides, preview).await
        }
        Commands::Inspect { module, pages } => inspect(module, pages).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct Overrides {
    module: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    pages: Option<u32>,
    fuel: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(module) = self.module {
            config.module.path = Some(module);
        }
        if let Some(width) = self.width {
            config.raster.width = width;
        }
        if let Some(height) = self.height {
            config.raster.height = height;
        }
        if let Some(pages) = self.pages {
            config.arena.pages = pages;
        }
        if let Some(fuel) = self.fuel {
            config.limits.fuel = Some(fuel);
        }
    }
}

async fn render(config_path: Option<PathBuf>, overrides: Overrides, preview: bool) -> Result<()> {
    let mut config = match config_path {
        Some(path) => BridgeConfig::from_file(&path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    overrides.apply(&mut config);
    if config.module.path.is_none() {
        bail!("no module given; pass --module or set [module] path in the config");
    }
    config.validate()?;

    let surface: SharedSurface<Framebuffer> =
        Framebuffer::shared(config.raster.width, config.raster.height);
    let session = RenderSession::open(config, surface.clone()).await?;
    let raster = session.config().raster;
    let outcome = session.render();

    if preview {
        let mut stdout = std::io::stdout().lock();
        preview::write_preview(&mut stdout, &surface.lock())?;
    }

    let report = outcome?;
    info!(session_id = %session.id(), "Render complete");
    println!(
        "Rendered {}x{}: {} lines painted, {} log entries, {} rejected",
        raster.width,
        raster.height,
        report.lines_painted,
        report.log_entries,
        report.rejected.len()
    );
    for rejected in &report.rejected {
        println!(
            "  row {}: expected {} bytes, got {}",
            rejected.row, rejected.expected, rejected.actual
        );
    }
    Ok(())
}

async fn inspect(module: PathBuf, pages: u32) -> Result<()> {
    let binary = ModuleBinary::from_file(&module)
        .await
        .with_context(|| format!("reading {}", module.display()))?;
    let arena = linebridge_core::ArenaConfig::new(pages);
    arena.validate()?;
    let host = ModuleHost::new(Default::default())?;
    let abi = host.inspect(&binary, arena)?;

    println!("Module: {}", binary.name());
    println!("Imports:");
    for import in &abi.imports {
        println!("  {}", import);
    }
    println!("Exports:");
    for export in &abi.exports {
        println!("  {}", export);
    }

    if abi.is_compatible() {
        println!("Compatible with the host ABI");
        Ok(())
    } else {
        for violation in &abi.violations {
            println!("  violation: {}", violation);
        }
        bail!("{} does not satisfy the host ABI", binary.name())
    }
}
