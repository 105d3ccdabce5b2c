use super::Vec2;

/// One tick of pointer and dialogue input, already mapped to world space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pointer_world_position: Option<Vec2>,
    clicked: bool,
    advance_dialogue_pressed: bool,
    pointer_over_ui: bool,
    choice_selected: Option<usize>,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_pointer_world_position(mut self, position: Option<Vec2>) -> Self {
        self.pointer_world_position = position;
        self
    }

    pub fn with_clicked(mut self, clicked: bool) -> Self {
        self.clicked = clicked;
        self
    }

    pub fn with_advance_dialogue_pressed(mut self, pressed: bool) -> Self {
        self.advance_dialogue_pressed = pressed;
        self
    }

    pub fn with_pointer_over_ui(mut self, over_ui: bool) -> Self {
        self.pointer_over_ui = over_ui;
        self
    }

    pub fn with_choice_selected(mut self, choice: Option<usize>) -> Self {
        self.choice_selected = choice;
        self
    }

    pub fn pointer_world_position(&self) -> Option<Vec2> {
        self.pointer_world_position
    }

    pub fn clicked(&self) -> bool {
        self.clicked
    }

    pub fn advance_dialogue_pressed(&self) -> bool {
        self.advance_dialogue_pressed
    }

    pub fn pointer_over_ui(&self) -> bool {
        self.pointer_over_ui
    }

    pub fn choice_selected(&self) -> Option<usize> {
        self.choice_selected
    }

    /// Click at a world position with no UI in the way.
    pub fn click_at(position: Vec2) -> Self {
        Self::empty()
            .with_pointer_world_position(Some(position))
            .with_clicked(true)
    }
}
