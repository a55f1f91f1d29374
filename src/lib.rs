pub mod answer;
pub mod config;
pub mod context;
pub mod dns;
pub mod error;
pub mod message;
pub mod rrset;
pub mod sort;
pub mod store;
pub mod zone;

pub use answer::{AnswerEngine, AnswerKind};
pub use context::WorkerContext;
pub use rrset::RRset;
pub use store::{Store, Transaction};
pub use zone::ZoneSync;
