//! Errors from the recipient-code and webhook-dedup caches. The caches
//! degrade to a miss on failure, so these mostly surface through the pool
//! health check.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// No usable connection: bad URL, Redis down, pool checkout timed out.
    #[error("redis unreachable: {0}")]
    Unreachable(String),

    #[error("redis command failed: {0}")]
    Command(#[from] redis::RedisError),

    /// A cached recipient code or webhook marker that is not valid JSON.
    #[error("cached value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<bb8::RunError<redis::RedisError>> for CacheError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(e) => CacheError::Unreachable(e.to_string()),
            bb8::RunError::TimedOut => {
                CacheError::Unreachable("timed out waiting for a pooled connection".to_string())
            }
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_unreachable() {
        let err = CacheError::from(bb8::RunError::<redis::RedisError>::TimedOut);
        assert!(matches!(err, CacheError::Unreachable(_)));
        assert!(err.to_string().starts_with("redis unreachable"));
    }

    #[test]
    fn bad_json_is_an_encoding_error() {
        let json = serde_json::from_str::<String>("{not json").unwrap_err();
        let err: CacheError = json.into();
        assert!(matches!(err, CacheError::Encoding(_)));
    }
}
