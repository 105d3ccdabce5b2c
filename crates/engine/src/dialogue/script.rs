use std::collections::HashMap;
use std::rc::Rc;

pub const DEFAULT_REVEAL_SECONDS_PER_CHAR: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Player,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineNext {
    #[default]
    Sequential,
    End,
    Goto(usize),
}

/// Side effects a line or choice carries as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueEffect {
    SetFlag { flag: String, value: bool },
    ToggleFlag { flag: String },
    ResetFlag { flag: String },
    Cue(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueChoice {
    pub label: String,
    pub next: LineNext,
    pub on_choose: Vec<DialogueEffect>,
}

impl DialogueChoice {
    pub fn new(label: impl Into<String>, next: LineNext) -> Self {
        Self {
            label: label.into(),
            next,
            on_choose: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: DialogueEffect) -> Self {
        self.on_choose.push(effect);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueLine {
    pub speaker: Speaker,
    pub text: String,
    pub reveal_seconds_per_char: f32,
    pub next: LineNext,
    pub choices: Vec<DialogueChoice>,
    pub on_start: Vec<DialogueEffect>,
    pub on_end: Vec<DialogueEffect>,
}

impl DialogueLine {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            reveal_seconds_per_char: DEFAULT_REVEAL_SECONDS_PER_CHAR,
            next: LineNext::Sequential,
            choices: Vec::new(),
            on_start: Vec::new(),
            on_end: Vec::new(),
        }
    }

    pub fn with_reveal_seconds_per_char(mut self, seconds: f32) -> Self {
        self.reveal_seconds_per_char = seconds.max(0.0);
        self
    }

    pub fn with_next(mut self, next: LineNext) -> Self {
        self.next = next;
        self
    }

    pub fn with_choice(mut self, choice: DialogueChoice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_on_start(mut self, effect: DialogueEffect) -> Self {
        self.on_start.push(effect);
        self
    }

    pub fn with_on_end(mut self, effect: DialogueEffect) -> Self {
        self.on_end.push(effect);
        self
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_instant(&self) -> bool {
        self.reveal_seconds_per_char <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueScript {
    pub id: String,
    pub player_name: String,
    pub other_name: String,
    pub lines: Vec<DialogueLine>,
}

impl DialogueScript {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            player_name: String::new(),
            other_name: String::new(),
            lines: Vec::new(),
        }
    }

    pub fn with_names(mut self, player: impl Into<String>, other: impl Into<String>) -> Self {
        self.player_name = player.into();
        self.other_name = other.into();
        self
    }

    pub fn with_line(mut self, line: DialogueLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn speaker_name(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Player => &self.player_name,
            Speaker::Other => &self.other_name,
        }
    }
}

/// Compiled scripts by id. Scripts are shared read-only with running dialogues.
#[derive(Debug, Clone, Default)]
pub struct ScriptLibrary {
    scripts: HashMap<String, Rc<DialogueScript>>,
}

impl ScriptLibrary {
    /// Replaces any script with the same id.
    pub fn insert(&mut self, script: DialogueScript) {
        self.scripts.insert(script.id.clone(), Rc::new(script));
    }

    pub fn get(&self, id: &str) -> Option<Rc<DialogueScript>> {
        self.scripts.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scripts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
