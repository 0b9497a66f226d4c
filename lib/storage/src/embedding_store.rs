// LMDB store of catalog embeddings
use icdx_core::{EmbeddingModel, Error, Result, Vector};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;

const DB_EMBEDDINGS: &str = "embeddings";
const DB_META: &str = "meta";

const META_MODEL: &str = "model";
const META_DIM: &str = "dim";
const META_COUNT: &str = "count";

const MAP_SIZE: usize = 1024 * 1024 * 1024; // 1GB, sparse on disk

/// Embeddings read back from the store, in key order
#[derive(Debug, Clone)]
pub struct StoredEmbeddings {
    pub model: EmbeddingModel,
    pub dim: usize,
    pub embeddings: Vec<(String, Vector)>,
}

fn storage_err(e: heed::Error) -> Error {
    Error::Storage(format!("lmdb: {}", e))
}

fn open_env(path: &Path) -> Result<Env> {
    unsafe {
        EnvOpenOptions::new()
            .map_size(MAP_SIZE)
            .max_dbs(2)
            .open(path)
    }
    .map_err(storage_err)
}

/// Close the environment so the same path can be opened again in this process
fn close_env(env: Env) {
    env.prepare_for_closing().wait();
}

fn encode_vector(vector: &Vector) -> Vec<u8> {
    vector.as_slice().iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8], dim: usize) -> Result<Vector> {
    if bytes.len() != dim * 4 {
        return Err(Error::InvalidDimension {
            expected: dim,
            actual: bytes.len() / 4,
        });
    }
    Ok(Vector::new(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    ))
}

/// Write `(code, embedding)` pairs plus the model id into a fresh LMDB
/// environment at `path`. Every vector must have the model's dimension.
pub fn write_embeddings(path: &Path, model: EmbeddingModel, embeddings: &[(String, Vector)]) -> Result<()> {
    let dim = model.dim();
    if let Some((_, bad)) = embeddings.iter().find(|(_, v)| v.dim() != dim) {
        return Err(Error::InvalidDimension {
            expected: dim,
            actual: bad.dim(),
        });
    }

    std::fs::create_dir_all(path)?;
    let env = open_env(path)?;
    let result = (|| -> Result<()> {
        let mut wtxn = env.write_txn().map_err(storage_err)?;
        let vectors: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(DB_EMBEDDINGS))
            .map_err(storage_err)?;
        let meta: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(DB_META))
            .map_err(storage_err)?;

        vectors.clear(&mut wtxn).map_err(storage_err)?;
        for (code, vector) in embeddings {
            vectors
                .put(&mut wtxn, code, &encode_vector(vector))
                .map_err(storage_err)?;
        }

        meta.put(&mut wtxn, META_MODEL, model.id().as_bytes())
            .map_err(storage_err)?;
        meta.put(&mut wtxn, META_DIM, &(dim as u32).to_le_bytes())
            .map_err(storage_err)?;
        meta.put(&mut wtxn, META_COUNT, &(embeddings.len() as u64).to_le_bytes())
            .map_err(storage_err)?;

        wtxn.commit().map_err(storage_err)
    })();
    close_env(env);
    result
}

/// Read the whole store into memory and close the environment.
pub fn read_embeddings(path: &Path) -> Result<StoredEmbeddings> {
    if !path.join("data.mdb").exists() {
        return Err(Error::Storage(format!("no embedding store at {}", path.display())));
    }

    let env = open_env(path)?;
    let result = (|| -> Result<StoredEmbeddings> {
        let rtxn = env.read_txn().map_err(storage_err)?;
        let meta: Database<Str, Bytes> = env
            .open_database(&rtxn, Some(DB_META))
            .map_err(storage_err)?
            .ok_or_else(|| Error::Storage("embedding store has no meta database".into()))?;
        let vectors: Database<Str, Bytes> = env
            .open_database(&rtxn, Some(DB_EMBEDDINGS))
            .map_err(storage_err)?
            .ok_or_else(|| Error::Storage("embedding store has no embeddings database".into()))?;

        let model_id = meta
            .get(&rtxn, META_MODEL)
            .map_err(storage_err)?
            .ok_or_else(|| Error::Storage("embedding store does not record its model".into()))?;
        let model: EmbeddingModel = std::str::from_utf8(model_id)
            .map_err(|e| Error::Storage(format!("invalid model id: {}", e)))?
            .parse()?;

        let dim = match meta.get(&rtxn, META_DIM).map_err(storage_err)? {
            Some([a, b, c, d]) => u32::from_le_bytes([*a, *b, *c, *d]) as usize,
            _ => return Err(Error::Storage("embedding store has no valid dimension".into())),
        };
        if dim != model.dim() {
            return Err(Error::InvalidDimension {
                expected: model.dim(),
                actual: dim,
            });
        }

        let mut embeddings = Vec::new();
        for entry in vectors.iter(&rtxn).map_err(storage_err)? {
            let (code, bytes) = entry.map_err(storage_err)?;
            embeddings.push((code.to_string(), decode_vector(bytes, dim)?));
        }

        Ok(StoredEmbeddings { model, dim, embeddings })
    })();
    close_env(env);
    result
}
