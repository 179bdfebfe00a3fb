use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(MentionId);
id_newtype!(PostId);

impl MentionId {
    /// Stream ids are decimal snowflakes: digits only, no leading zero.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.bytes().all(|b| b.is_ascii_digit())
            && (self.0.len() == 1 || !self.0.starts_with('0'))
    }

    /// Parse a trimmed, well-formed id; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let id = Self::new(raw.trim());
        id.is_well_formed().then_some(id)
    }
}

/// Numeric order for well-formed ids of arbitrary width ("9" < "10").
impl Ord for MentionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for MentionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An inbound mention. `id` is optional because vendor payloads are not
/// trusted to carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: Option<MentionId>,
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
}

impl Mention {
    pub fn new(id: impl Into<MentionId>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
            author_id: None,
        }
    }

    /// The id, if present and well-formed.
    pub fn valid_id(&self) -> Option<&MentionId> {
        self.id.as_ref().filter(|id| id.is_well_formed())
    }
}

/// One fetch of the mention stream. `data: None` means the response body was
/// missing or malformed, which is distinct from an empty batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionPage {
    pub data: Option<Vec<Mention>>,
}

impl MentionPage {
    pub fn of(mentions: Vec<Mention>) -> Self {
        Self {
            data: Some(mentions),
        }
    }

    pub fn malformed() -> Self {
        Self { data: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub id: PostId,
    pub text: String,
}
