// ABOUTME: Identifier authority for every persisted entity kind
// ABOUTME: Generates opaque, kind-prefixed short ids using nanoid

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the random part of every generated id
pub const ID_RANDOM_LEN: usize = 12;

const ALPHANUMERIC: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z',
];

const HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Every kind of entity the store knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tool,
    KnowledgeSource,
    Agent,
    Task,
    Crew,
    Run,
}

impl EntityKind {
    /// Id prefix for this kind. Tools carry no prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Tool => "",
            Self::KnowledgeSource => "KS_",
            Self::Agent => "A_",
            Self::Task => "T_",
            Self::Crew => "C_",
            Self::Run => "CR_",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::KnowledgeSource => "knowledge_source",
            Self::Agent => "agent",
            Self::Task => "task",
            Self::Crew => "crew",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh id for the given entity kind
pub fn generate_id(kind: EntityKind) -> String {
    match kind {
        EntityKind::Tool => nanoid::nanoid!(ID_RANDOM_LEN, &HEX),
        other => format!(
            "{}{}",
            other.prefix(),
            nanoid::nanoid!(ID_RANDOM_LEN, &ALPHANUMERIC)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prefixed_ids() {
        let agent = generate_id(EntityKind::Agent);
        assert!(agent.starts_with("A_"));
        assert_eq!(agent.len(), 2 + ID_RANDOM_LEN);

        let ks = generate_id(EntityKind::KnowledgeSource);
        assert!(ks.starts_with("KS_"));

        let run = generate_id(EntityKind::Run);
        assert!(run.starts_with("CR_"));
        assert!(run[3..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tool_ids_are_hex() {
        let tool = generate_id(EntityKind::Tool);
        assert_eq!(tool.len(), ID_RANDOM_LEN);
        assert!(tool.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id(EntityKind::Task)).collect();
        assert_eq!(ids.len(), 1000);
    }
}
