use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelArtifact {
    /// Serialized estimator written by joblib (or a bare pickle).
    JoblibPath(PathBuf),
    OnnxPath(PathBuf),
}

impl ModelArtifact {
    /// Picks the artifact kind from the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("onnx") => Ok(Self::OnnxPath(path)),
            Some("joblib" | "pkl" | "pickle") => Ok(Self::JoblibPath(path)),
            Some(other) => {
                bail!("unsupported model extension: .{other} (expected onnx, joblib, pkl or pickle)")
            }
            None => bail!(
                "cannot infer model kind of {} without an extension",
                path.display()
            ),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::JoblibPath(p) | Self::OnnxPath(p) => p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_kind_from_extension() {
        assert_eq!(
            ModelArtifact::from_path("m/gbr.ONNX").unwrap(),
            ModelArtifact::OnnxPath("m/gbr.ONNX".into())
        );
        assert!(matches!(
            ModelArtifact::from_path("gbr.pkl").unwrap(),
            ModelArtifact::JoblibPath(_)
        ));
        assert!(ModelArtifact::from_path("gbr.h5").is_err());
        assert!(ModelArtifact::from_path("gbr").is_err());
    }
}
