/// Errors raised while converting features to and from Mapbox Vector Tile messages.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MvtError {
    #[error("{0} geometries cannot be encoded as a vector tile feature")]
    UnsupportedGeometry(&'static str),

    #[error("Layer extent must be a positive number of pixels")]
    InvalidExtent,

    #[error("Unable to decode vector tile: {0}")]
    Decode(String),

    #[error("Malformed geometry command stream: {0}")]
    MalformedGeometry(String),
}

pub type MvtResult<T> = Result<T, MvtError>;
