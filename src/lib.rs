//! lexbert - hybrid retrieval for legal and institutional documents.
//!
//! Questions about regulations usually name the unit they care about
//! ("¿Qué dice el artículo 52?"). lexbert answers those with an exact
//! structural lookup over chunk metadata, and fills the remaining slots with
//! semantic vector similarity from a local sentence-embedding model. The
//! ranked chunks are then assembled into a bounded, cited context for a
//! generation model.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lexbert::{
//!     ChunkDb,
//!     ConfigDb,
//!     DataDir,
//!     ModelManager,
//!     Retrieval,
//!     RetrievalConfig,
//!     Retriever,
//! };
//!
//! # async fn run() -> lexbert::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let config_db = ConfigDb::open(&data_dir.config_db())?;
//! let config = RetrievalConfig::load(&config_db)?;
//! let store = Arc::new(ChunkDb::open(&data_dir.chunks_db())?);
//! let encoder = Arc::new(ModelManager::new(
//!     lexbert::model_manager::DEFAULT_MODEL_ID.to_string(),
//! ));
//!
//! let retriever = Retriever::new(store, encoder, config);
//! match retriever.retrieve("¿Qué dice el artículo 52?", None).await? {
//!     Retrieval::Found(result) => {
//!         let context = lexbert::context::assemble(&result.hits, 3000);
//!         println!("{}", context.text);
//!     }
//!     Retrieval::NoRelevantContent => {
//!         println!("{}", lexbert::prompt::NO_CONTEXT_REPLY)
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod chunk;
pub mod chunk_db;
pub mod chunk_id;
pub mod config;
pub mod config_db;
pub mod context;
pub mod data_dir;
pub mod encoder;
pub mod error;
pub mod import;
pub mod model_manager;
pub mod prompt;
pub mod query;
pub mod resolver;
pub mod retrieval;
pub mod store;
pub mod text_util;
pub mod vector_search;

#[cfg(test)]
mod testing;

pub use chunk::{Chunk, ChunkMetadata};
pub use chunk_db::ChunkDb;
pub use chunk_id::ChunkId;
pub use config::RetrievalConfig;
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use encoder::Encoder;
pub use error::{Error, Result};
pub use model_manager::ModelManager;
pub use query::Query;
pub use resolver::{StructuralKind, StructuralReference};
pub use retrieval::{
    MatchKind,
    Retrieval,
    RetrievalHit,
    RetrievalResult,
    Retriever,
};
pub use store::{ChunkStore, ScoredChunk};
