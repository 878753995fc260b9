//! Keystroke classification
//!
//! Decides, per key press, whether the key goes to the child as a keyboard command, is
//! swallowed because it would touch read-only history, submits the pending line, or edits
//! the buffer like a normal text box.

use crate::console::buffer::EditOp;

use super::keymapper::{Key, KeyInput, KeyMap};

/// Where the caret stands when the key arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteContext {
    pub boundary: usize,
    /// Caret, or the start of the selection when one is active
    pub caret: usize,
    pub process_running: bool,
    /// False while the console is read-only (no process, or input disabled)
    pub editable: bool,
}

/// What to do with a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Send these bytes to the child and swallow the key
    Forward(Vec<u8>),
    /// Swallow the key
    Suppress,
    /// Send `[boundary, caret)` as a line; the key then ends the line in the buffer
    Submit,
    /// Normal line editing
    Edit(EditOp),
    /// Not ours; the host may use it (scrolling, copy)
    Pass,
}

#[derive(Debug, Clone, Default)]
pub struct InputRouter {
    keymap: KeyMap,
    forward_keyboard_commands: bool,
}

impl InputRouter {
    pub fn new(keymap: KeyMap, forward_keyboard_commands: bool) -> Self {
        Self {
            keymap,
            forward_keyboard_commands,
        }
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn forwards_keyboard_commands(&self) -> bool {
        self.forward_keyboard_commands
    }

    pub fn set_forward_keyboard_commands(&mut self, enabled: bool) {
        self.forward_keyboard_commands = enabled;
    }

    pub fn route(&self, input: &KeyInput, ctx: &RouteContext) -> Route {
        if self.forward_keyboard_commands && ctx.process_running {
            if let Some(mapping) = self.keymap.lookup(input) {
                return Route::Forward(mapping.send.clone());
            }
        }

        let always_allowed = input.key.is_arrow() || input.is_copy();

        if ctx.caret <= ctx.boundary && input.key == Key::Backspace {
            return Route::Suppress;
        }

        if ctx.caret < ctx.boundary && !always_allowed {
            return Route::Suppress;
        }

        if !ctx.editable && !always_allowed {
            return Route::Suppress;
        }

        if input.key == Key::Enter {
            return Route::Submit;
        }

        Self::edit_for(input)
    }

    fn edit_for(input: &KeyInput) -> Route {
        if let Some(ch) = input.typed_char() {
            return Route::Edit(EditOp::Insert(ch.to_string()));
        }
        if !input.modifiers.is_empty() && !input.key.is_arrow() {
            return Route::Pass;
        }
        match input.key {
            Key::Backspace => Route::Edit(EditOp::DeleteBackward),
            Key::Delete => Route::Edit(EditOp::DeleteForward),
            Key::Left => Route::Edit(EditOp::MoveLeft),
            Key::Right => Route::Edit(EditOp::MoveRight),
            Key::Home => Route::Edit(EditOp::MoveHome),
            Key::End => Route::Edit(EditOp::MoveEnd),
            Key::Tab => Route::Edit(EditOp::Insert("\t".to_string())),
            _ => Route::Pass,
        }
    }
}
