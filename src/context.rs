//! Per-worker state reused across requests.

use crate::message::MessageBuilder;
use crate::rrset::RRset;
use crate::store::{self, Store, Transaction};

/// One per worker, created at startup and reset between requests.
///
/// Holds the pooled read transaction and the scratch sets and message buffer
/// answers are built in, so a request allocates nothing once buffers have
/// grown to their working size.
pub struct WorkerContext {
    pub(crate) txn: Option<Box<dyn Transaction>>,
    pub(crate) soa: RRset,
    pub(crate) answer: RRset,
    pub(crate) cut: RRset,
    pub(crate) message: MessageBuilder,
}

impl WorkerContext {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            txn: None,
            soa: RRset::default(),
            answer: RRset::default(),
            cut: RRset::default(),
            message: MessageBuilder::new(max_message_size),
        }
    }

    /// Ready the read transaction for the next request: the pooled handle is
    /// renewed, or a fresh one opened on first use
    pub(crate) fn begin(&mut self, store: &dyn Store) -> store::Result<()> {
        if let Some(txn) = self.txn.as_mut() {
            return txn.renew();
        }
        self.txn = Some(store.txn(true)?);
        Ok(())
    }

    /// Drop the snapshot but keep the handle for the next request
    pub(crate) fn release(&mut self) {
        if let Some(txn) = self.txn.as_mut() {
            txn.reset();
        }
        self.soa.clear();
        self.answer.clear();
        self.cut.clear();
    }

    pub fn has_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn max_message_size(&self) -> usize {
        self.message.capacity()
    }
}
