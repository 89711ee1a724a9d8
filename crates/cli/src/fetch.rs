use std::path::PathBuf;

use async_trait::async_trait;
use runboard_poll::{FetchError, ResourceFetcher};

/// Serves resources from `<dir>/<id>.json`; a missing file is a not-found answer.
pub struct FsFetcher {
    dir: PathBuf,
}

impl FsFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    fn path_for(&self, resource: &str) -> PathBuf { self.dir.join(format!("{}.json", resource)) }
}

#[async_trait]
impl ResourceFetcher for FsFetcher {
    type Data = serde_json::Value;

    async fn fetch(&self, resource: &str) -> Result<serde_json::Value, FetchError> {
        let path = self.path_for(resource);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(FetchError::Transient(format!("{}: {}", path.display(), e))),
        };
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Transient(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("runboard-fetch-{}", nanos));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn missing_file_is_not_found_and_garbage_is_transient() {
        let dir = temp_dir();
        std::fs::write(dir.join("ok.json"), br#"{"name": "model-a"}"#).unwrap();
        std::fs::write(dir.join("bad.json"), b"{not json").unwrap();
        let f = FsFetcher::new(&dir);

        assert_eq!(f.fetch("ok").await.unwrap()["name"], "model-a");
        assert!(matches!(f.fetch("gone").await, Err(FetchError::NotFound(_))));
        assert!(matches!(f.fetch("bad").await, Err(FetchError::Transient(_))));
    }
}
