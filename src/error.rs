use thiserror::Error;

/// Errors raised while constructing the renderer.
///
/// These are fatal: the renderer cannot be built and nothing is retried.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Cache capacity must be at least one entry
    #[error("Invalid cache capacity: {0} (must be greater than 0)")]
    InvalidCacheCapacity(usize),

    /// Placeholder tile dimensions must be non-zero
    #[error("Invalid tile size: {width}x{height} (both dimensions must be greater than 0)")]
    InvalidTileSize { width: u32, height: u32 },

    /// The graphics backend could not set up the draw pipeline
    #[error("Graphics backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),
}

/// Errors reported by a graphics backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// A shader stage failed to compile
    #[error("Failed to compile {stage} shader: {message}")]
    ShaderCompile {
        stage: &'static str,
        message: String,
    },

    /// The program does not declare a required vertex attribute
    #[error("Program has no attribute named {0}")]
    MissingAttribute(String),

    /// The program does not declare a required uniform
    #[error("Program has no uniform named {0}")]
    MissingUniform(String),

    /// The texture handle does not refer to a live texture
    #[error("Unknown texture handle: {0}")]
    UnknownTexture(u32),

    /// Pixel buffer length does not match the declared dimensions
    #[error("Pixel data size mismatch: {width}x{height} RGBA needs {expected} bytes, got {actual}")]
    PixelSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Errors that can occur while fetching or decoding tile imagery.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The tile does not exist at the remote location
    #[error("Tile not found: {0}")]
    NotFound(String),

    /// The server answered with a non-success status
    #[error("HTTP {status} while fetching {url}")]
    Http { status: u16, url: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The payload is not a decodable image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The response body exceeds the configured size limit
    #[error("Response for {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
}

/// Reason a texture ended up in the failed state.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The image could not be fetched or decoded
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The decoded pixels could not be uploaded to the texture
    #[error("Upload failed: {0}")]
    Upload(#[from] BackendError),
}
