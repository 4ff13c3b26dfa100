//! Resume retrieval-augmented generation: extraction, chunking, embedding,
//! the in-memory vector index, and the query side used by interview turns.

pub mod chunk;
pub mod embedding;
pub mod extract;
pub mod handlers;
pub mod index;
pub mod ingest;
pub mod retrieval;
