//! Keyboard handling and rendering.
//!
//! - **keymapper**: Key model and the keyboard-command table
//! - **router**: Decides what each key press does to the buffer or the child
//! - **renderer**: Draws a console buffer with crossterm

pub mod keymapper;
pub mod renderer;
pub mod router;

pub use keymapper::{Key, KeyInput, KeyMap, KeyMapping, Modifiers};
pub use renderer::{Cell, Layout, Renderer};
pub use router::{InputRouter, Route, RouteContext};
