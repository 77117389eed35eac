//! Classification of node-reported broadcast failures
//!
//! Nodes report the kind of a rejected transaction only through message text.
//! All matching lives here so the send loop only ever sees a [`BroadcastFailure`].

const INVALID_SENDER: &[&str] = &["invalid sender"];
const NONCE_DRIFT: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "doesn't have the correct nonce",
];
const KNOWN_TRANSACTION: &[&str] = &["known transaction"];
const VM_EXCEPTION: &[&str] = &["vm exception"];

/// Recovery action implied by a broadcast failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastFailure {
    /// Signature or sender identity rejected by the node
    InvalidSender,
    /// Cached nonce disagrees with the node
    NonceDrift,
    /// The node already holds a transaction at this nonce
    KnownTransaction,
    /// Included but reverted; gas and nonce were consumed
    VmException,
    Other,
}

impl BroadcastFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastFailure::InvalidSender => "invalid_sender",
            BroadcastFailure::NonceDrift => "nonce_drift",
            BroadcastFailure::KnownTransaction => "known_transaction",
            BroadcastFailure::VmException => "vm_exception",
            BroadcastFailure::Other => "other",
        }
    }
}

/// Map a node error message onto a recovery action.
///
/// Checks run in a fixed order; the first matching family wins.
pub fn classify_broadcast_error(message: &str) -> BroadcastFailure {
    let msg = message.to_ascii_lowercase();
    let matches_any = |patterns: &[&str]| patterns.iter().any(|p| msg.contains(p));

    if matches_any(INVALID_SENDER) {
        BroadcastFailure::InvalidSender
    } else if matches_any(NONCE_DRIFT) {
        BroadcastFailure::NonceDrift
    } else if matches_any(KNOWN_TRANSACTION) {
        BroadcastFailure::KnownTransaction
    } else if matches_any(VM_EXCEPTION) {
        BroadcastFailure::VmException
    } else {
        BroadcastFailure::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_messages() {
        let cases = [
            ("invalid sender", BroadcastFailure::InvalidSender),
            (
                "(code: -32000, message: nonce too low, data: None)",
                BroadcastFailure::NonceDrift,
            ),
            ("nonce too high", BroadcastFailure::NonceDrift),
            (
                "the tx doesn't have the correct nonce. account has nonce of: 5 tx has nonce of: 3",
                BroadcastFailure::NonceDrift,
            ),
            (
                "known transaction: 0x2c4b0e3f",
                BroadcastFailure::KnownTransaction,
            ),
            (
                "VM Exception while processing transaction: revert",
                BroadcastFailure::VmException,
            ),
            ("insufficient funds for gas * price + value", BroadcastFailure::Other),
            ("", BroadcastFailure::Other),
        ];

        for (message, expected) in cases {
            assert_eq!(classify_broadcast_error(message), expected, "{}", message);
        }
    }

    #[test]
    fn test_sender_check_wins_over_nonce() {
        assert_eq!(
            classify_broadcast_error("invalid sender: nonce too low"),
            BroadcastFailure::InvalidSender
        );
    }
}
