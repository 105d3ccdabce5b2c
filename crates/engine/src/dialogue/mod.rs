mod engine;
mod script;

pub use engine::{DialogueEngine, DialogueEvent, DialogueFinished, DialogueTicket, FinishReason};
pub use script::{
    DialogueChoice, DialogueEffect, DialogueLine, DialogueScript, LineNext, ScriptLibrary, Speaker,
    DEFAULT_REVEAL_SECONDS_PER_CHAR,
};
