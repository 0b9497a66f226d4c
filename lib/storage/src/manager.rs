use crate::artifacts::{ArtifactStore, Manifest};
use icdx_core::{load_catalog, BuildConfig, CatalogIndexBuilder, Error, HnswParams, IndexSet, Result};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

struct Loaded {
    set: Arc<IndexSet>,
    manifest: Manifest,
}

/// Owns the live index set of a running service.
///
/// Readers take a cheap `Arc` clone of the current set. [`IndexManager::reload`]
/// loads a complete new set before swapping it in, so queries never observe a
/// half-loaded index and a failed reload leaves the old set serving.
pub struct IndexManager {
    store: ArtifactStore,
    params: HnswParams,
    loaded: RwLock<Loaded>,
    // One reload at a time: the LMDB environment can only be open once per process
    reload_guard: Mutex<()>,
}

impl IndexManager {
    /// Load the index set from `dir`. Any configuration error is returned and
    /// the service should not start.
    pub fn open<P: AsRef<Path>>(dir: P, params: HnswParams) -> Result<Self> {
        let store = ArtifactStore::new(dir.as_ref());
        let (set, manifest) = store.load(params)?;
        Ok(Self {
            store,
            params,
            loaded: RwLock::new(Loaded {
                set: Arc::new(set),
                manifest,
            }),
            reload_guard: Mutex::new(()),
        })
    }

    /// Wrap an already assembled set, e.g. one built in memory
    pub fn from_set<P: AsRef<Path>>(dir: P, set: IndexSet, manifest: Manifest, params: HnswParams) -> Self {
        Self {
            store: ArtifactStore::new(dir.as_ref()),
            params,
            loaded: RwLock::new(Loaded {
                set: Arc::new(set),
                manifest,
            }),
            reload_guard: Mutex::new(()),
        }
    }

    #[inline]
    pub fn current(&self) -> Arc<IndexSet> {
        self.loaded.read().set.clone()
    }

    pub fn manifest(&self) -> Manifest {
        self.loaded.read().manifest.clone()
    }

    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Load the artifacts again and swap them in.
    ///
    /// Loading happens outside the read/write lock and reloads are serialized.
    /// On error the previous set keeps serving. A reload that would lose a
    /// working vector path while the manifest still names an embedding model
    /// is an error too.
    pub fn reload(&self) -> Result<Manifest> {
        let _guard = self.reload_guard.lock();
        match self.load_checked() {
            Ok((set, manifest)) => {
                let mut loaded = self.loaded.write();
                loaded.set = Arc::new(set);
                loaded.manifest = manifest.clone();
                info!(entries = manifest.entries, built_at = %manifest.built_at, "index reloaded");
                Ok(manifest)
            }
            Err(e) => {
                error!(error = %e, "index reload failed, keeping previous index");
                Err(e)
            }
        }
    }

    fn load_checked(&self) -> Result<(IndexSet, Manifest)> {
        let (set, manifest) = self.store.load(self.params)?;
        if manifest.embedding_model.is_some() && self.current().vector().is_available() {
            if let Some(reason) = set.vector().degraded_reason() {
                return Err(Error::Storage(format!("vector index did not load: {}", reason)));
            }
        }
        Ok((set, manifest))
    }

    /// Build indexes for the catalog file at `catalog` and save them to `out`.
    pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(catalog: P, out: Q, config: BuildConfig) -> Result<Manifest> {
        let entries = load_catalog(catalog.as_ref())?;
        info!(catalog = %catalog.as_ref().display(), entries = entries.len(), "loaded catalog");
        let built = CatalogIndexBuilder::new(config).build(&entries)?;
        ArtifactStore::new(out.as_ref()).save(&built)
    }
}
