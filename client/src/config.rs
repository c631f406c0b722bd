use {
    crate::error::SyncError,
    anyhow::Result,
    byte_unit::Byte,
    derivative::Derivative,
    url::Url,
};

pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;
/// Default upload buffer threshold, as a multiple of the chunk size.
pub const UPLOAD_THRESHOLD_CHUNKS: u64 = 20;
pub const DEFAULT_CACHE_CAPACITY: u64 = 16 * 1024 * 1024;

/// Resolved settings for one invocation. Constructed once at startup and
/// passed by reference everywhere; there is no ambient configuration.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Config {
    pub server_url: Url,
    #[derivative(Debug = "ignore")]
    pub access_token: String,
    pub chunk_size: usize,
    pub upload_threshold: u64,
    pub cache_capacity: u64,
}

impl Config {
    pub fn new(
        server_url: Url,
        access_token: String,
        chunk_size: Option<Byte>,
        upload_threshold: Option<Byte>,
        cache_capacity: Option<Byte>,
    ) -> Result<Self> {
        let chunk_size = match chunk_size {
            Some(byte) => usize::try_from(byte.as_u64())
                .map_err(|_| SyncError::Config("chunk size does not fit in memory".into()))?,
            None => DEFAULT_CHUNK_SIZE,
        };
        if chunk_size == 0 {
            return Err(SyncError::Config("chunk size cannot be zero".into()).into());
        }
        let upload_threshold = match upload_threshold {
            Some(byte) => byte.as_u64(),
            None => UPLOAD_THRESHOLD_CHUNKS * chunk_size as u64,
        };
        let cache_capacity = match cache_capacity {
            Some(byte) => byte.as_u64(),
            None => DEFAULT_CACHE_CAPACITY,
        };
        Ok(Self {
            server_url,
            access_token,
            chunk_size,
            upload_threshold,
            cache_capacity,
        })
    }
}
