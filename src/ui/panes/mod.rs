//! TUI pane rendering modules
//!
//! - [`source`]: the sample program with breakpoints and the current stop
//! - [`variables`]: locals of the selected frame with synthetic children
//! - [`console`]: `frame variable` transcript
//! - [`status`]: stop position, library and keybindings
//!
//! Each pane exports a `render_*` function taking precomputed data; none of
//! them query the session while drawing.

pub mod console;
pub mod source;
pub mod status;
pub mod variables;

pub use console::render_console_pane;
pub use source::{render_source_pane, SourceRenderData, SourceScrollState};
pub use status::{render_status_bar, StatusRenderData};
pub use variables::{
    render_variables_pane, variable_rows, Expander, VariableRow, VariablesRenderData,
    VariablesScrollState,
};

use crate::ui::theme::DEFAULT_THEME;
use ratatui::style::{Modifier, Style};

fn border_style(is_focused: bool) -> Style {
    if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    }
}
