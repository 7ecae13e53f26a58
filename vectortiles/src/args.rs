use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args as ClapArgs, Parser, Subcommand};
use vectortiles_tile_utils::Format;

use crate::config::BackendKind;
use crate::{VectorTilesError, VectorTilesResult};

/// Defines the styles used for the CLI help output.
const HELP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Blue.on_default().bold())
    .usage(AnsiColor::Blue.on_default().bold())
    .literal(AnsiColor::White.on_default())
    .placeholder(AnsiColor::Green.on_default());

#[derive(Parser, Debug, PartialEq)]
#[command(
    version,
    name = "vectortiles",
    about = "Render Mapbox Vector Tiles on demand from PostGIS tables and GeoJSON files",
    after_help = "Use RUST_LOG environment variable to control logging level, e.g. RUST_LOG=debug or RUST_LOG=vectortiles=debug. Use VECTORTILES_LOG_FORMAT to pick one of full, compact, bare, pretty or json.",
    styles = HELP_STYLES
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Render one tile of the configured layers
    #[command(name = "render")]
    Render(RenderArgs),
    /// Print the TileJSON document describing the configured layers
    #[command(name = "tilejson")]
    TileJson(TileJsonArgs),
    /// Decode an MVT file and print its layers as JSON
    #[command(name = "inspect", alias = "decode")]
    Inspect {
        /// Tile file to read
        file: PathBuf,
    },
}

#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct ConfigArgs {
    /// Path to the YAML config file
    #[arg(short, long)]
    pub config: PathBuf,
    /// Override the geometry backend of the config file
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct RenderArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Tile address as z/x/y, optionally with a .mvt or .pbf extension
    pub tile: String,
    /// File to write the tile to. Without it only the status is printed.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct TileJsonArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Tile URL template written into the document
    #[arg(long, default_value = "http://localhost:3000/tiles/{z}/{x}/{y}.mvt")]
    pub url: String,
}

/// Split a `z/x/y[.ext]` tile address. Range checks happen when rendering.
pub fn parse_tile_address(value: &str) -> VectorTilesResult<(i64, i64, i64)> {
    let bad = || VectorTilesError::BadTileAddress(value.to_string());
    let path = match value.rsplit_once('.') {
        Some((path, ext)) if Format::parse(ext).is_some() => path,
        Some(_) => return Err(bad()),
        None => value,
    };
    let mut parts = path.trim_matches('/').split('/');
    let (Some(z), Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(bad());
    };
    let parse = |v: &str| v.parse::<i64>().map_err(|_| bad());
    Ok((parse(z)?, parse(x)?, parse(y)?))
}
