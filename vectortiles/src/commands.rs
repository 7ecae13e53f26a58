//! Implementation of the CLI subcommands.

use std::io::Write;
use std::path::Path;

use tracing::{info, warn};
use vectortiles_core::tiles::mvt::decode_tile;

use crate::args::{Args, Commands, ConfigArgs, RenderArgs, TileJsonArgs, parse_tile_address};
use crate::config::{Env, TileService, read_config};
use crate::{VectorTilesError, VectorTilesResult};

/// Run one CLI invocation, writing its report to `out`.
pub async fn run<'a>(
    args: Args,
    env: &'a impl Env<'a>,
    out: &mut impl Write,
) -> VectorTilesResult<()> {
    match args.command {
        Commands::Render(args) => render(args, env, out).await,
        Commands::TileJson(args) => tilejson(args, env, out).await,
        Commands::Inspect { file } => inspect(&file, out),
    }
}

async fn load_service<'a>(args: &ConfigArgs, env: &'a impl Env<'a>) -> VectorTilesResult<TileService> {
    info!("Using {}", args.config.display());
    let mut config = read_config(&args.config, env)?;
    if let Some(backend) = args.backend {
        config.backend = Some(backend);
    }
    config.finalize()?;
    Ok(TileService::from_config(&config, env).await?)
}

async fn render<'a>(
    args: RenderArgs,
    env: &'a impl Env<'a>,
    out: &mut impl Write,
) -> VectorTilesResult<()> {
    let (z, x, y) = parse_tile_address(&args.tile)?;
    let service = load_service(&args.config, env).await?;
    let tile = service.render_tile(z, x, y).await?;

    if !tile.is_complete() {
        warn!(
            "Tile {z}/{x}/{y} is missing layers {}",
            tile.failed_layers.join(", ")
        );
    }
    if let Some(path) = &args.output {
        std::fs::write(path, &tile.data)
            .map_err(|e| VectorTilesError::WriteError(e, path.clone()))?;
        info!("Wrote {} bytes to {}", tile.data.len(), path.display());
    }
    writeln!(
        out,
        "{} {} bytes etag={}",
        tile.status.code(),
        tile.data.len(),
        tile.etag
    )
    .map_err(VectorTilesError::StdoutError)?;
    Ok(())
}

async fn tilejson<'a>(
    args: TileJsonArgs,
    env: &'a impl Env<'a>,
    out: &mut impl Write,
) -> VectorTilesResult<()> {
    let service = load_service(&args.config, env).await?;
    let doc = service.tilejson(&args.url);
    serde_json::to_writer_pretty(&mut *out, &doc)?;
    writeln!(out).map_err(VectorTilesError::StdoutError)?;
    Ok(())
}

fn inspect(file: &Path, out: &mut impl Write) -> VectorTilesResult<()> {
    let data = std::fs::read(file).map_err(|e| VectorTilesError::ReadError(e, file.to_path_buf()))?;
    let layers =
        decode_tile(&data).map_err(|e| VectorTilesError::DecodeError(e, file.to_path_buf()))?;
    serde_json::to_writer_pretty(&mut *out, &layers)?;
    writeln!(out).map_err(VectorTilesError::StdoutError)?;
    Ok(())
}
