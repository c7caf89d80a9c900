//! Console pane: transcript of printed variables and session events

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::Style,
    widgets::{Block, Borders, List, ListItem, Padding, Paragraph},
    Frame,
};

/// Render the console pane. `scroll_offset` of `usize::MAX` sticks to the bottom.
pub fn render_console_pane(
    frame: &mut Frame,
    area: Rect,
    lines: &[String],
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let block = Block::default()
        .title(" Console ")
        .borders(Borders::ALL)
        .border_style(super::border_style(is_focused));

    if lines.is_empty() {
        let paragraph = Paragraph::new("(press p to print the selected variable)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    let max_scroll = lines.len().saturating_sub(visible_height);
    *scroll_offset = (*scroll_offset).min(max_scroll);

    let items: Vec<ListItem> = lines
        .iter()
        .skip(*scroll_offset)
        .take(visible_height)
        .map(|line| {
            let color = if line.starts_with("error:") {
                DEFAULT_THEME.error
            } else if line.starts_with("(lldb)") {
                DEFAULT_THEME.comment
            } else {
                DEFAULT_THEME.fg
            };
            ListItem::new(line.as_str()).style(Style::default().fg(color))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}
