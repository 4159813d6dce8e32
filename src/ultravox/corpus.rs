//! Knowledge-corpus readiness gate.

use tracing::warn;

use super::{CORPUS_STATUS_READY, UltravoxClient};

/// Checks whether a corpus is ready to be attached to a call.
///
/// Fails soft: a transport or parse error on the status query is logged and
/// treated as "not ready", because the session being negotiated must still
/// be able to proceed without the corpus. Readiness is never cached; the
/// state can change between calls.
#[derive(Debug, Clone)]
pub struct CorpusGate {
    client: UltravoxClient,
}

impl CorpusGate {
    pub fn new(client: UltravoxClient) -> Self {
        Self { client }
    }

    /// One status query; `true` only when the corpus reports ready.
    pub async fn is_ready(&self, corpus_id: &str) -> bool {
        match self.client.corpus_status(corpus_id).await {
            Ok(status) => status.status == CORPUS_STATUS_READY,
            Err(e) => {
                warn!(corpus_id, error = %e, "corpus status check failed, treating as not ready");
                false
            }
        }
    }
}
