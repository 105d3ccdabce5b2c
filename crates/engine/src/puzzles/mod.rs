//! Walk-then-act coordinators built on the interaction lock. Each one takes
//! the lock when the actor arrives and hands it back on every exit path.

mod conversation;
mod fetch_quest;
mod mash;
mod search;

pub use conversation::ConversationProp;
pub use fetch_quest::{FetchQuest, FetchQuestFlags, FetchQuestScripts};
pub use mash::{MashConfig, MashPuzzle};
pub use search::{KeyHunt, KeyPlacement, SearchProp, SearchScripts, DEFAULT_SEARCH_SECONDS};
