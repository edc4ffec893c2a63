use crate::common::error::T5DataError;
use crate::resources::ResourceProvider;
use std::path::PathBuf;

/// # Local resource
#[derive(Debug, PartialEq, Clone)]
pub struct LocalResource {
    /// Local path for the resource
    pub local_path: PathBuf,
}

impl ResourceProvider for LocalResource {
    /// Gets the path for a local resource. The file is required to exist.
    ///
    /// # Returns
    ///
    /// * `PathBuf` pointing to the resource file
    fn get_local_path(&self) -> Result<PathBuf, T5DataError> {
        if !self.local_path.is_file() {
            return Err(T5DataError::IOError(format!(
                "Local resource {} does not exist",
                self.local_path.display()
            )));
        }
        Ok(self.local_path.clone())
    }
}

impl From<PathBuf> for LocalResource {
    fn from(local_path: PathBuf) -> Self {
        LocalResource { local_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_resource_requires_existing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("spiece.model");

        let resource = LocalResource::from(path.clone());
        assert!(resource.get_local_path().is_err());

        std::fs::write(&path, b"model")?;
        assert_eq!(resource.get_local_path()?, path);
        Ok(())
    }
}
