//! Builders for candidates, descriptors and chats.

use marquee_core::{
    CandidateId, CandidateResult, ChatId, ChatKind, ChatRef, InboundEvent, InboundMessage,
    TransferDescriptor,
};

/// Group chat used by most scenarios.
pub const GROUP: ChatId = ChatId(-42);

/// Descriptor whose info hash is `hash`.
#[must_use]
pub fn descriptor(hash: &str) -> TransferDescriptor {
    TransferDescriptor::new(format!("magnet:?xt=urn:btih:{hash}&dn={hash}"))
}

/// Healthy candidate that passes the default admission thresholds.
#[must_use]
pub fn candidate(title: &str) -> CandidateResult {
    CandidateResult {
        id: CandidateId::generate(),
        source: "fixture".to_string(),
        title: title.to_string(),
        seeds: 120,
        leeches: 4,
        size_kb: 1_024_000,
        source_link: format!("https://fixture.local/{title}"),
        descriptor: Some(descriptor(title)),
        category: Some("movies".to_string()),
    }
}

/// Candidate with explicit swarm and size values.
#[must_use]
pub fn candidate_with(title: &str, seeds: u32, leeches: u32, size_kb: u64) -> CandidateResult {
    CandidateResult {
        seeds,
        leeches,
        size_kb,
        ..candidate(title)
    }
}

/// Group chat reference.
#[must_use]
pub fn group_chat() -> ChatRef {
    ChatRef {
        id: GROUP,
        kind: ChatKind::Group,
        title: Some("fixtures".to_string()),
    }
}

/// Private chat reference.
#[must_use]
pub const fn private_chat() -> ChatRef {
    ChatRef {
        id: ChatId(7),
        kind: ChatKind::Private,
        title: None,
    }
}

/// Text message event in `chat`.
#[must_use]
pub fn message(chat: ChatRef, text: &str) -> InboundEvent {
    InboundEvent::Message(InboundMessage {
        chat,
        message_id: 1,
        sender: Some("tester".to_string()),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_unique_and_valid() {
        let first = candidate("alpha");
        let second = candidate("alpha");
        assert_ne!(first.id, second.id);
        assert!(first.descriptor.is_some_and(|d| !d.is_blank()));
        assert_eq!(candidate_with("beta", 1, 2, 3).size_kb, 3);
    }
}
