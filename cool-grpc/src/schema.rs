//! Protocol schema loading.
//!
//! A [`Schema`] is a descriptor pool assembled from one or more sources:
//! `.proto` files compiled at runtime with `protox`, encoded
//! `FileDescriptorSet` files, or encoded sets already in memory.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use prost_reflect::{DescriptorPool, MethodDescriptor, ServiceDescriptor};
use prost_types::FileDescriptorSet;

use crate::DispatchError;

/// Where to read protocol definitions from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaSource {
    /// A `.proto` file; its directory is the include path for imports.
    ProtoFile(PathBuf),
    /// A file holding an encoded `FileDescriptorSet`.
    DescriptorSetFile(PathBuf),
    /// An encoded `FileDescriptorSet`.
    DescriptorSet(Bytes),
}

impl From<PathBuf> for SchemaSource {
    /// Paths ending in `.proto` are compiled; anything else is read as a
    /// descriptor set.
    fn from(path: PathBuf) -> Self {
        if path.extension().is_some_and(|ext| ext == "proto") {
            SchemaSource::ProtoFile(path)
        } else {
            SchemaSource::DescriptorSetFile(path)
        }
    }
}

impl From<&Path> for SchemaSource {
    fn from(path: &Path) -> Self {
        path.to_path_buf().into()
    }
}

impl From<&str> for SchemaSource {
    fn from(path: &str) -> Self {
        PathBuf::from(path).into()
    }
}

impl From<String> for SchemaSource {
    fn from(path: String) -> Self {
        PathBuf::from(path).into()
    }
}

/// Resolved protocol definitions.
#[derive(Clone, Debug)]
pub struct Schema {
    pool: DescriptorPool,
}

impl Schema {
    /// Wrap an existing descriptor pool.
    pub fn from_pool(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    /// Build a schema from a decoded descriptor set.
    pub fn from_file_descriptor_set(set: FileDescriptorSet) -> Result<Self, DispatchError> {
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_set(set)
            .map_err(|e| DispatchError::SchemaLoad(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Load and merge every source into one schema.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SchemaLoad`] when there are no sources, a file
    /// cannot be read, a `.proto` file does not compile, or two sources
    /// define the same file differently.
    pub async fn load<I, S>(sources: I) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SchemaSource>,
    {
        let mut pool = DescriptorPool::new();
        let mut loaded = 0usize;

        for source in sources {
            let source = source.into();
            tracing::debug!(?source, "loading schema source");

            match source {
                SchemaSource::ProtoFile(path) => {
                    let set = compile_proto(path).await?;
                    pool.add_file_descriptor_set(set)
                        .map_err(|e| DispatchError::SchemaLoad(e.to_string()))?;
                }
                SchemaSource::DescriptorSetFile(path) => {
                    let bytes = tokio::fs::read(&path).await.map_err(|e| {
                        DispatchError::SchemaLoad(format!("failed to read {}: {e}", path.display()))
                    })?;
                    pool.decode_file_descriptor_set(bytes.as_slice())
                        .map_err(|e| DispatchError::SchemaLoad(e.to_string()))?;
                }
                SchemaSource::DescriptorSet(bytes) => {
                    pool.decode_file_descriptor_set(bytes)
                        .map_err(|e| DispatchError::SchemaLoad(e.to_string()))?;
                }
            }
            loaded += 1;
        }

        if loaded == 0 {
            return Err(DispatchError::SchemaLoad("no schema sources given".into()));
        }

        Ok(Self { pool })
    }

    /// Get the underlying descriptor pool.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Look up a service by its package-qualified name.
    pub fn service(&self, full_name: &str) -> Option<ServiceDescriptor> {
        self.pool.get_service_by_name(full_name)
    }

    /// Look up a method by its fully qualified name, e.g. `pkg.Svc.Method`.
    pub fn resolve_method(&self, full_name: &str) -> Option<MethodDescriptor> {
        let (service, method) = full_name.rsplit_once('.')?;
        self.service(service)?
            .methods()
            .find(|candidate| candidate.name() == method)
    }
}

/// Compile a `.proto` file with its parent directory as the include path.
async fn compile_proto(path: PathBuf) -> Result<FileDescriptorSet, DispatchError> {
    let display = path.display().to_string();
    let file_name = path
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| DispatchError::SchemaLoad(format!("not a file: {display}")))?;
    let include = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    tokio::task::spawn_blocking(move || {
        protox::compile([file_name], [include]).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| DispatchError::SchemaLoad(format!("schema compilation aborted: {e}")))?
    .map_err(|e| DispatchError::SchemaLoad(format!("failed to compile {display}: {e}")))
}
