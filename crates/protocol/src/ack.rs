//! Acknowledgment building
//!
//! Builds the `MSH`/`MSA` response envelope for an inbound message:
//!
//! ```text
//! MSH|^~\&|<app>|<org>|||<YYYYMMDDHHMMSS>||ACK|<controlId>|P|2.5.1|
//! MSA|<responseCode>|<controlId>[|<text>]
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::message::Message;

/// Sending application used when the policy leaves it unset.
pub const DEFAULT_APPLICATION: &str = "gofer ENGINE";

/// Response code used when the policy leaves it unset (`AA` = accept).
pub const DEFAULT_RESPONSE_CODE: &str = "AA";

/// Final rewrite hook: `(built_ack, original_message, filtered) -> ack`.
pub type AckMutator = Arc<dyn Fn(Message, &Message, bool) -> Message + Send + Sync>;

/// Acknowledgment policy for one `ack` pipeline step.
#[derive(Clone, Default)]
pub struct AckConfig {
    /// Sending application (`MSH-3`), defaults to [`DEFAULT_APPLICATION`]
    pub application: Option<String>,
    /// Sending facility/organization (`MSH-4`), defaults to empty
    pub organization: Option<String>,
    /// `MSA-1` response code, defaults to [`DEFAULT_RESPONSE_CODE`]
    pub response_code: Option<String>,
    /// Optional free text appended as `MSA-3`
    pub text: Option<String>,
    /// Optional rewrite of the built ack before it is sent
    pub mutator: Option<AckMutator>,
}

impl fmt::Debug for AckConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckConfig")
            .field("application", &self.application)
            .field("organization", &self.organization)
            .field("response_code", &self.response_code)
            .field("text", &self.text)
            .field("mutator", &self.mutator.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Build the acknowledgment for `message` under `config`.
///
/// `filtered` is the pipeline's filtered flag at the time the ack step runs;
/// the engine itself only forwards it to the custom mutator; the default
/// envelope does not depend on it.
pub fn build_ack(message: &Message, config: &AckConfig, filtered: bool) -> Message {
    let app = config.application.as_deref().unwrap_or(DEFAULT_APPLICATION);
    let org = config.organization.as_deref().unwrap_or("");
    let code = config
        .response_code
        .as_deref()
        .unwrap_or(DEFAULT_RESPONSE_CODE);
    let text = config.text.as_deref().unwrap_or("");
    let control_id = message.control_id().unwrap_or("");
    let now = Utc::now().format("%Y%m%d%H%M%S");

    let mut raw = format!(
        "MSH|^~\\&|{app}|{org}|||{now}||ACK|{control_id}|P|2.5.1|\nMSA|{code}|{control_id}"
    );
    if !text.is_empty() {
        raw.push('|');
        raw.push_str(text);
    }

    // The template above always has at least one segment.
    let ack = Message::parse(&raw).unwrap_or_else(|_| unreachable!("ack template is non-empty"));

    match &config.mutator {
        Some(mutator) => mutator(ack, message, filtered),
        None => ack,
    }
}
