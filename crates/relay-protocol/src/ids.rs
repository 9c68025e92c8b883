//! Newtype identifiers
//!
//! The platform identifies chats, messages and users with opaque integers.
//! Wrapping them keeps `(chat, msg)` argument orders honest at compile time.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw integer value as the platform encodes it
            #[inline]
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

id_type! {
    /// Identifies a chat (channel or group) on the platform
    ChatId
}

id_type! {
    /// Identifies a message within a chat
    ///
    /// Message ids are only unique per chat; a replication pair fixes the
    /// source chat, so `(MsgId, PairId)` is a safe global key while a bare
    /// `MsgId` is not.
    MsgId
}

id_type! {
    /// Identifies a replication pair in the registry
    PairId
}

id_type! {
    /// Identifies a sending identity in the pool
    SenderId
}

id_type! {
    /// Identifies a platform user account
    UserId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_get() {
        let chat = ChatId(-1001234);
        assert_eq!(chat.to_string(), "-1001234");
        assert_eq!(chat.get(), -1001234);
    }

    #[test]
    fn test_serde_transparent() {
        let msg = MsgId(42);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, "42");
        let back: MsgId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_ids_are_distinct_types() {
        fn takes_chat(_: ChatId) {}
        takes_chat(ChatId::from(7));
    }
}
