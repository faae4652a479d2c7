//! Image Marshalling - Host Files ⇄ Module Matrices
//!
//! Reading decodes a host file through the [`HostEnvironment`] and hands the
//! pixels to the module allocator. Writing renders a matrix onto a fresh
//! canvas, encodes it, and writes the bytes with the requested open flag.
//!
//! Neither direction releases a matrix: `read_image` returns an owning
//! [`MatrixHandle`], `write_image` only borrows one.
//!
//! [`HostEnvironment`]: crate::environment::HostEnvironment

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::engine::EngineLoader;
use crate::environment::DEFAULT_FORMAT;
use crate::error::{BridgeError, Result};
use crate::matrix::MatrixHandle;

/// How the output file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteFlag {
    /// Create if absent, truncate if present (`w+`).
    #[default]
    #[serde(alias = "w+", alias = "w")]
    CreateOrTruncate,
    /// Fail if the file exists (`wx`).
    #[serde(alias = "wx", alias = "wx+")]
    CreateNew,
    /// Create if absent, append if present (`a`).
    #[serde(alias = "a", alias = "a+")]
    Append,
}

impl FromStr for WriteFlag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "create-or-truncate" | "w+" | "w" => Ok(WriteFlag::CreateOrTruncate),
            "create-new" | "wx" | "wx+" => Ok(WriteFlag::CreateNew),
            "append" | "a" | "a+" => Ok(WriteFlag::Append),
            other => Err(format!("unknown write flag: {other}")),
        }
    }
}

impl fmt::Display for WriteFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteFlag::CreateOrTruncate => "create-or-truncate",
            WriteFlag::CreateNew => "create-new",
            WriteFlag::Append => "append",
        };
        f.write_str(name)
    }
}

impl WriteFlag {
    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            WriteFlag::CreateOrTruncate => options.write(true).create(true).truncate(true),
            WriteFlag::CreateNew => options.write(true).create_new(true),
            WriteFlag::Append => options.append(true).create(true),
        };
        options
    }
}

/// Options of [`ImageIo::write_image`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// MIME type of the encoded output.
    pub format: String,
    pub flag: WriteFlag,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            flag: WriteFlag::default(),
        }
    }
}

impl WriteOptions {
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn flag(mut self, flag: WriteFlag) -> Self {
        self.flag = flag;
        self
    }
}

/// Reads and writes images on behalf of the embedded module.
///
/// Every operation loads the engine on demand through the shared loader.
#[derive(Debug, Clone)]
pub struct ImageIo {
    loader: Arc<EngineLoader>,
}

impl ImageIo {
    pub fn new(loader: Arc<EngineLoader>) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &Arc<EngineLoader> {
        &self.loader
    }

    /// Decode the host file at `path` into a new module matrix.
    pub async fn read_image(&self, path: impl AsRef<Path>) -> Result<MatrixHandle> {
        let path = path.as_ref().to_path_buf();
        let engine = self.loader.ensure_ready().await?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| BridgeError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let environment = self.loader.environment().clone();
        let decoded = tokio::task::spawn_blocking(move || environment.decode(&bytes))
            .await
            .map_err(|e| BridgeError::Decode {
                path: path.clone(),
                reason: format!("decode task failed: {e}"),
            })?;
        let raster = decoded.map_err(|e| BridgeError::Decode {
            path: path.clone(),
            reason: format!("{e:#}"),
        })?;

        let matrices = engine.matrices();
        let id = matrices.from_raster(&raster)?;
        info!(path = ?path, matrix = %id, width = raster.width(), height = raster.height(), "Image read");
        Ok(MatrixHandle::adopt(id, matrices))
    }

    /// Encode `matrix` and write it to the host file at `path`.
    ///
    /// The format is validated before the file is opened, so an unsupported
    /// format leaves the filesystem untouched.
    pub async fn write_image(
        &self,
        path: impl AsRef<Path>,
        matrix: &MatrixHandle,
        options: &WriteOptions,
    ) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        self.loader.ensure_ready().await?;

        let size = matrix.size()?;
        let environment = self.loader.environment().clone();
        let mut canvas = environment.create_canvas(size);
        matrix.render(&mut canvas)?;

        let format = options.format.clone();
        let bytes = tokio::task::spawn_blocking(move || environment.encode(&canvas, &format))
            .await
            .map_err(|e| BridgeError::Encode {
                format: options.format.clone(),
                reason: format!("encode task failed: {e}"),
            })??;

        write_bytes(&path, &bytes, options.flag).await?;
        info!(path = ?path, matrix = %matrix.id(), format = %options.format, flag = %options.flag, "Image written");
        Ok(())
    }

    /// [`read_image`](Self::read_image) with a module path, resolved through
    /// the mount (relative paths start at the module working directory).
    pub async fn read_image_virtual(&self, path: &str) -> Result<MatrixHandle> {
        let host = self.resolve_virtual(path).await?;
        self.read_image(host).await
    }

    /// [`write_image`](Self::write_image) with a module path.
    pub async fn write_image_virtual(
        &self,
        path: &str,
        matrix: &MatrixHandle,
        options: &WriteOptions,
    ) -> Result<()> {
        let host = self.resolve_virtual(path).await?;
        self.write_image(host, matrix, options).await
    }

    async fn resolve_virtual(&self, path: &str) -> Result<PathBuf> {
        let engine = self.loader.ensure_ready().await?;
        let host = engine.fs().resolve_host(path)?;
        debug!(virtual_path = path, host = ?host, "Resolved module path");
        Ok(host)
    }
}

async fn write_bytes(path: &Path, bytes: &[u8], flag: WriteFlag) -> Result<()> {
    let io_err = |source| BridgeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = flag.open_options().open(path).await.map_err(io_err)?;
    file.write_all(bytes).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    debug!(path = ?path, bytes = bytes.len(), "Wrote encoded image");
    Ok(())
}
